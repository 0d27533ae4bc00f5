use mailcatch::{ServerConfig, SmtpServer};
use std::env;
use std::net::SocketAddr;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mailcatch=info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let addr = if args.len() > 1 {
        args[1].as_str()
    } else {
        "127.0.0.1:2525"
    };

    let domain = if args.len() > 2 {
        args[2].as_str()
    } else {
        "localhost"
    };

    let addr: SocketAddr = match addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(addr, error = %e, "invalid listen address");
            std::process::exit(2);
        }
    };

    let config = ServerConfig::new()
        .with_domain(domain)
        .with_bind_address(addr.ip())
        .with_port(addr.port());
    let server = SmtpServer::new(config);
    let messages = server.subscribe();

    if let Err(e) = server.start() {
        error!(error = %e, "failed to start server");
        std::process::exit(1);
    }

    let mut count = 0;
    while let Ok(email) = messages.recv() {
        count += 1;
        let to: Vec<String> = email.to.iter().map(ToString::to_string).collect();
        info!(
            count,
            from = %email.from.as_ref().map(ToString::to_string).unwrap_or_default(),
            to = ?to,
            subject = email.subject.as_deref().unwrap_or(""),
            attachments = email.attachments.len(),
            "received email"
        );
    }
}
