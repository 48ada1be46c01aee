use std::process::ExitCode;

fn main() -> ExitCode {
    tiller_cli::run()
}
