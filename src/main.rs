/*
 * Copyright 2026 polyfsck contributors
 *
 * This file is part of polyfsck.
 *
 * polyfsck is free software: you can redistribute it and/or modify it under
 * the terms of the GNU General Public License as published by the Free
 * Software Foundation, either version 3 of the License, or (at your option)
 * any later version.
 *
 * polyfsck is distributed in the hope that it will be useful, but WITHOUT
 * ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
 * FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
 * more details.
 *
 * You should have received a copy of the GNU General Public License along
 * with polyfsck. If not, see <https://www.gnu.org/licenses/>.
 */

//! Entry point: parses arguments, runs the validator/extractor, and maps
//! the outcome to an `fsck`-style exit code.

use polyfsck::cli;
use polyfsck::error::PolyfsckError;
use polyfsck::error::EXIT_OK;
use polyfsck::Verbosity;
use std::env;
use std::process::exit;

fn main() {
    let mut args = env::args_os();
    let bin = args
        .next()
        .and_then(|s| s.into_string().ok())
        .unwrap_or_else(|| "polyfsck".to_string());

    let parsed = cli::parse_args(args).unwrap_or_else(|e| {
        eprintln!("{bin}: {e}");
        cli::print_usage();
        exit(e.exit_code());
    });

    if parsed.help {
        cli::print_help();
        exit(EXIT_OK);
    }

    let Some(image_path) = parsed.image_path else {
        cli::print_usage();
        exit(PolyfsckError::Usage("no image given".into()).exit_code());
    };

    let verbosity = Verbosity(parsed.verbosity);
    match polyfsck::run(&image_path, parsed.extract_to.as_deref(), verbosity) {
        Ok(report) => {
            if report.image_longer_than_declared {
                println!(
                    "{}: warning: image is longer than its declared size",
                    image_path.display()
                );
            }
            if verbosity.prints_inodes() {
                println!("{}: OK", image_path.display());
            }
            exit(EXIT_OK);
        }
        Err(e) => {
            eprintln!("{}: {e}", image_path.display());
            exit(e.exit_code());
        }
    }
}
