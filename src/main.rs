use std::process::ExitCode;

use fade_stop::app;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let result = app::start().await;
    match result {
        Ok(..) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:?}");
            ExitCode::FAILURE
        }
    }
}
