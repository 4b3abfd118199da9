use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    craftsync_lib::run().await
}
