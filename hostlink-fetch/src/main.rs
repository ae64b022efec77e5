use anyhow::Context;

fn main() -> anyhow::Result<()> {
  let args: Vec<String> = std::env::args().collect();

  if args.iter().any(|a| a == "--version") {
    println!("{}", env!("CARGO_PKG_VERSION"));
    return Ok(());
  }

  let opts = hostlink_fetch::FetchOptions::from_args(&args)?;
  hostlink_fetch::run(&opts).context("hostlink-fetch run")
}
