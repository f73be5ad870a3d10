use std::net::SocketAddr;

/// Install the Prometheus exporter when `GIG_METRICS_PORT` is set. Counters
/// recorded before (or without) installation are simply dropped.
pub fn init_metrics() {
    let port: u16 = match std::env::var("GIG_METRICS_PORT") {
        Ok(v) => match v.parse() {
            Ok(p) => p,
            Err(_) => return,
        },
        Err(_) => return,
    };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => {
            println!("[metrics] Prometheus exporter listening on http://{}/metrics", addr);
        }
        Err(e) => {
            println!("[metrics] Prometheus exporter install failed: {}", e);
        }
    }
}
