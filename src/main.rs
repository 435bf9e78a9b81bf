use std::process::ExitCode;

fn main() -> ExitCode {
    match medimind_lib::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("medimind: {e}");
            ExitCode::FAILURE
        }
    }
}
