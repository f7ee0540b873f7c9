use std::process::ExitCode;

fn main() -> ExitCode {
    actgate_cli::run()
}
