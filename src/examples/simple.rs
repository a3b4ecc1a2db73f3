//! Simple example of using trawler.

use std::time::Duration;

use trawler::{Trawler, TrawlerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = TrawlerConfig::builder()
        // free proxy listings, one `host:port` per line
        .source(
            "http",
            vec![
                "https://raw.githubusercontent.com/TheSpeedX/SOCKS-List/master/http.txt",
                "https://vakhov.github.io/fresh-proxy-list/http.txt",
                "https://raw.githubusercontent.com/monosans/proxy-list/refs/heads/main/proxies/http.txt",
            ],
        )
        .test_target("https://httpstat.us")
        .timeout(Duration::from_secs(3))
        .build()?;

    let targets: Vec<String> = (1..=500)
        .map(|i| format!("https://httpstat.us/200?id={i}"))
        .collect();

    println!("Fetching {} targets...", targets.len());

    Trawler::new(config)
        .run(targets, |body| {
            println!("got {} bytes", body.len());
        })
        .await;

    Ok(())
}
