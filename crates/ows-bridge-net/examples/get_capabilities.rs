//! Fetch a WFS capabilities document synchronously.
//!
//! Run with: cargo run -p ows-bridge-net --example get_capabilities -- <service-url>

use std::sync::Arc;
use std::time::Duration;

use ows_bridge_net::cache::MemoryCache;
use ows_bridge_net::{ErrorCode, NetworkContext, OwsRequest, RequestOptions};

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let base = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://demo.mapserver.org/cgi-bin/wfs".to_string());
    let url = format!("{base}?SERVICE=WFS&REQUEST=GetCapabilities");

    let context = NetworkContext::builder()
        .timeout(Duration::from_secs(30))
        .cache(Arc::new(MemoryCache::new()))
        .build()
        .expect("Failed to create network context");

    let request = OwsRequest::builder(&context)
        .error_context("Download of capabilities failed")
        .build();
    request.download_progress().connect(|progress| match progress.percent() {
        Some(percent) => println!("{} bytes ({percent}%)", progress.bytes_transferred),
        None => println!("{} bytes", progress.bytes_transferred),
    });

    if !request.send_get(&url, RequestOptions::default()) {
        match request.error_code() {
            ErrorCode::Timeout => eprintln!("timed out: {}", request.error_message()),
            code => eprintln!("{code:?}: {}", request.error_message()),
        }
        return;
    }
    println!("{}", String::from_utf8_lossy(&request.response()));

    // A second fetch is answered from the annotated cache entry.
    if request.send_get(&url, RequestOptions::default()) {
        println!("cached: {} bytes", request.response().len());
    }
}
