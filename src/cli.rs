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

//! Command line parsing and usage/help text (§6).
//!
//! Hand-rolled against `std::env::args_os`, matching the teacher's
//! `fdisk`/`mkfs` parsers rather than pulling in an argument-parsing crate.

use crate::error::PolyfsckError;
use std::env::ArgsOs;
use std::path::PathBuf;

/// Structure storing command line arguments.
#[derive(Default)]
pub struct Args {
    /// If true, print command line help and exit.
    pub help: bool,
    /// Verbosity level: `-v` may be repeated, `-vv` gives block-level detail.
    pub verbosity: u8,
    /// If set, extract the image into this directory instead of validating
    /// only.
    pub extract_to: Option<PathBuf>,
    /// The path to the image file to check.
    pub image_path: Option<PathBuf>,
}

/// Parses the program's arguments, excluding the binary name (the caller is
/// expected to have already consumed `args_os().next()`).
pub fn parse_args(args: ArgsOs) -> Result<Args, PolyfsckError> {
    let mut res = Args::default();
    let mut iter = args.peekable();

    while let Some(arg) = iter.next() {
        match arg.to_str() {
            Some("-h" | "--help") => res.help = true,
            Some("-v" | "--verbose") => res.verbosity = res.verbosity.saturating_add(1),
            Some("-vv") => res.verbosity = res.verbosity.saturating_add(2),
            Some("-x") => {
                let dir = iter
                    .next()
                    .ok_or_else(|| PolyfsckError::Usage("-x requires a directory".into()))?;
                res.extract_to = Some(PathBuf::from(dir));
            }
            Some(s) if s.starts_with("-x") && s.len() > 2 => {
                res.extract_to = Some(PathBuf::from(&s[2..]));
            }
            Some(s) if s.starts_with('-') && s != "-" => {
                return Err(PolyfsckError::Usage(format!("unrecognized option `{s}`")));
            }
            _ => {
                if res.image_path.is_some() {
                    return Err(PolyfsckError::Usage("only one image may be given".into()));
                }
                res.image_path = Some(PathBuf::from(arg));
            }
        }
    }

    Ok(res)
}

/// Prints command usage.
pub fn print_usage() {
    eprintln!("polyfsck: bad usage");
    eprintln!("Try 'polyfsck --help' for more information.");
}

/// Prints command help.
pub fn print_help() {
    println!();
    println!("Usage:");
    println!(" polyfsck [options] <image>");
    println!();
    println!("Checks the integrity of a polyfs filesystem image and, optionally,");
    println!("extracts its contents.");
    println!();
    println!("Options:");
    println!(" -h, --help\tPrints help.");
    println!(" -v, --verbose\tPrints an entry for each inode visited; repeat for per-block detail.");
    println!(" -x DIR\tExtracts the image's contents into DIR.");
    println!();
}

#[cfg(test)]
mod test {
    use super::*;
    use std::ffi::OsString;

    fn os_args(strs: &[&str]) -> Vec<OsString> {
        strs.iter().map(OsString::from).collect()
    }

    #[test]
    fn parses_image_path_only() {
        let args = parse_args(os_args(&["image.polyfs"]).into_iter()).unwrap();
        assert_eq!(args.image_path, Some(PathBuf::from("image.polyfs")));
        assert_eq!(args.verbosity, 0);
        assert!(!args.help);
        assert!(args.extract_to.is_none());
    }

    #[test]
    fn repeated_verbose_accumulates() {
        let args = parse_args(os_args(&["-v", "-v", "image.polyfs"]).into_iter()).unwrap();
        assert_eq!(args.verbosity, 2);
    }

    #[test]
    fn extract_flag_with_separate_argument() {
        let args = parse_args(os_args(&["-x", "/tmp/out", "image.polyfs"]).into_iter()).unwrap();
        assert_eq!(args.extract_to, Some(PathBuf::from("/tmp/out")));
    }

    #[test]
    fn extract_flag_with_attached_argument() {
        let args = parse_args(os_args(&["-x/tmp/out", "image.polyfs"]).into_iter()).unwrap();
        assert_eq!(args.extract_to, Some(PathBuf::from("/tmp/out")));
    }

    #[test]
    fn unknown_option_is_a_usage_error() {
        let err = parse_args(os_args(&["--bogus"]).into_iter()).unwrap_err();
        assert!(matches!(err, PolyfsckError::Usage(_)));
    }

    #[test]
    fn two_image_paths_is_a_usage_error() {
        let err = parse_args(os_args(&["a.polyfs", "b.polyfs"]).into_iter()).unwrap_err();
        assert!(matches!(err, PolyfsckError::Usage(_)));
    }

    #[test]
    fn help_flag_is_recognized() {
        let args = parse_args(os_args(&["-h"]).into_iter()).unwrap();
        assert!(args.help);
    }
}
