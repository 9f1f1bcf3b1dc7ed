//! Process entry point: installs the global allocator and delegates to
//! [`cli::run`].

#![deny(unsafe_code)]

use std::{env, io, process::ExitCode};

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> ExitCode {
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    let code = cli::run(env::args_os(), &mut stdout, &mut stderr);
    ExitCode::from(code as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn version_flag_reports_success() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = cli::run(["agedu", "--version"], &mut stdout, &mut stderr);
        assert_eq!(code, 0);
        assert!(!stdout.is_empty());
    }

    #[test]
    fn scan_and_query_round_trip_through_the_installed_allocator() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), vec![0u8; 4096]).unwrap();
        let out = dir.path().join("out.agedu");

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = cli::run(
            [
                "agedu",
                "scan",
                dir.path().to_str().unwrap(),
                "-o",
                out.to_str().unwrap(),
            ],
            &mut stdout,
            &mut stderr,
        );
        assert_eq!(code, 0, "stderr: {}", String::from_utf8_lossy(&stderr));
        assert!(out.exists());
    }
}
