use clap::Parser;
use echo_prober::{ProbeConfig, Prober, ProberConfigBuilder, SocketKind};
use std::io::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Probe hosts with ICMP echo requests and print per-host statistics as JSON
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Host names or IPv4 addresses to probe
    #[arg(required = true)]
    addresses: Vec<String>,

    /// Echo requests sent to each host
    #[arg(short, long, default_value_t = 3)]
    count: usize,

    /// Milliseconds to wait between requests to the same host
    #[arg(short, long, default_value_t = 1000)]
    delay_ms: u64,

    /// Milliseconds to wait for each reply
    #[arg(short, long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Use a raw socket instead of an unprivileged ping socket
    #[arg(long)]
    raw: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let socket_kind = if args.raw {
        SocketKind::Raw
    } else {
        SocketKind::Dgram
    };
    let mut prober = Prober::open(
        ProberConfigBuilder::new()
            .with_socket_kind(socket_kind)
            .with_response_timeout(Duration::from_millis(args.timeout_ms))
            .build(),
    )
    .unwrap();

    let ctx = CancellationToken::new();
    let ctx_ctrlc = ctx.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        ctx_ctrlc.cancel();
    });

    let config = ProbeConfig {
        count: args.count,
        delay: Duration::from_millis(args.delay_ms),
    };
    let results = prober.probe(&ctx, &config, &args.addresses).await;
    prober.close().await;

    {
        let mut stdout = std::io::stdout().lock();
        for address in &args.addresses {
            if let Some(result) = results.get(address) {
                let status = if result.is_reachable() {
                    "reachable"
                } else {
                    "unreachable"
                };
                writeln!(
                    stdout,
                    "{} {} {}",
                    address,
                    status,
                    serde_json::to_string(result).unwrap()
                )
                .unwrap();
            }
        }
    }
}
