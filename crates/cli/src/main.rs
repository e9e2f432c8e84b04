use std::process::ExitCode;

fn main() -> ExitCode {
    brewline_cli::run()
}
