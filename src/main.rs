// src/main.rs

use tuttle::{cli, execute, logging};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("tuttle error: {err:?}");
        std::process::exit(2);
    }

    let code = match execute(args.command).await {
        Ok(status) => status.exit_code(),
        Err(err) => {
            eprintln!("tuttle error: {err}");
            2
        }
    };
    std::process::exit(code);
}
