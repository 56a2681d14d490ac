use crate::bootstrap;
use crate::config::AuditLogConfig;
use crate::error::Result;

/// Execute the `serve` command: run consumers and the HTTP server until Ctrl-C.
pub async fn execute(
    mut config: AuditLogConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    println!("A3S Audit Log starting...");
    println!("Listening on http://{}", config.server.bind_address());
    println!("Press Ctrl+C to stop");

    let reports = bootstrap::run(config).await?;

    let failed: Vec<_> = reports.iter().filter(|r| !r.is_ok()).collect();
    for report in &failed {
        eprintln!(
            "consumer {} failed: {}",
            report.binding,
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!(
        "Stopped {} consumer(s), {} failed",
        reports.len(),
        failed.len()
    );
    Ok(())
}
