//! Watch one scan from a running server and print per-region sentiment when it completes.
//!
//! Usage: `scan-watch [limit]` (server URL from SCANNER_URL, default http://127.0.0.1:8000).
//! Ctrl-C cancels the scan.

use news_impact_scanner::client::ScanClient;
use news_impact_scanner::reconcile::{Lifecycle, Transition};
use news_impact_scanner::scan::ScanParams;
use news_impact_scanner::ScanState;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let base_url =
        std::env::var("SCANNER_URL").unwrap_or_else(|_| "http://127.0.0.1:8000".to_string());
    let limit = std::env::args()
        .nth(1)
        .map(|s| s.parse::<usize>())
        .transpose()?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let client = ScanClient::new(base_url)?;
    let mut state = ScanState::new();
    let result = client
        .run(ScanParams { limit }, &cancel, &mut state, |s, t| match t {
            Transition::Updated => {
                let p = s.progress();
                if p.total > 0 {
                    print!("\ranalyzed {}/{}", p.current, p.total);
                } else if let Some(status) = s.last_status() {
                    println!("{}", status.message);
                }
            }
            Transition::Completed => print_summary(s),
            Transition::Failed(msg) => eprintln!("\nscan failed: {msg}"),
            Transition::Ignored => {}
        })
        .await;

    if let Lifecycle::Cancelled = state.lifecycle() {
        println!("\ncancelled after {} results", state.analyzed_count());
    }
    result?;
    Ok(())
}

fn print_summary(state: &ScanState) {
    println!();
    println!(
        "{} articles, overall sentiment {:+}",
        state.analyzed_count(),
        state.sentiment_score()
    );
    for v in state.region_views() {
        println!(
            "  {:<14} {:>3} articles  {:>3} bullish  {:>3} bearish  score {:+}",
            v.region.as_str(),
            v.count,
            v.bullish,
            v.bearish,
            v.sentiment_score
        );
    }
}
