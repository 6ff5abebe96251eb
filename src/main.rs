use std::process::ExitCode;

fn main() -> ExitCode {
    match tcsf_fit::app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            if err.is_invariant_violation() {
                eprintln!("This is a fitting defect, not a data problem; rerun with --debug-bundle and report it.");
            }
            ExitCode::from(err.exit_code())
        }
    }
}
