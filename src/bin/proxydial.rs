use std::env;
use std::io::Result;

use log::info;
use proxydial::{Config, Dialer, Network, Strategy, Target};
use tokio::io::{self, AsyncWriteExt};
use tokio::runtime::Runtime;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 || args.len() > 5 {
        println!(
            "Usage: {} config.toml <direct|http|socks5> <host:port> [tcp|udp]",
            args.first().map_or("proxydial", String::as_str)
        );
        return Ok(());
    }

    env_logger::builder()
        .format_timestamp(None)
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let config = Config::load(&args[1])?;
    let strategy: Strategy = args[2].parse()?;
    let target = Target::guess(args[3].as_str());
    let network: Network = args.get(4).map_or("tcp", |n| n.as_str()).parse()?;

    let dialer = Dialer::new(config.proxy);
    info!("Proxy {:?}", dialer.config());

    let rt = Runtime::new()?;
    rt.block_on(async move {
        let conn = dialer.dial(strategy, network, &target).await?;
        info!("{} connected from {}", target.addr, conn.local_addr()?);
        let (mut reader, mut writer) = io::split(conn);

        let mut stdin = io::stdin();
        let mut stdout = io::stdout();

        let upload = async {
            let n = io::copy(&mut stdin, &mut writer).await?;
            writer.shutdown().await?;
            Ok::<_, std::io::Error>(n)
        };
        let download = io::copy(&mut reader, &mut stdout);

        let (up, down) = futures::try_join!(upload, download)?;
        info!("{} closed, sent {} received {}", target.addr, up, down);
        Ok::<_, std::io::Error>(())
    })
}
