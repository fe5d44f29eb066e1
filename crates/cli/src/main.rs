use std::process::ExitCode;

fn main() -> ExitCode {
    deskflow_cli::run()
}
