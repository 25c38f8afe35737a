use clap::Parser;

fn main() {
    let cli = job104_crawler::Cli::parse();
    if let Err(err) = job104_crawler::run(cli) {
        eprintln!("❌ crawl failed: {err}");
        std::process::exit(1);
    }
}
