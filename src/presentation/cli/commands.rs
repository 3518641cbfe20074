//! CLI commands using clap

use crate::application::dto::CopyOptions;
use clap::{ArgGroup, Parser};
use std::ffi::OsString;

const NAME_EXAMPLES: &str = "\
Examples of valid from/to names:
  \\\\?\\Volume{884d6af9-a72a-11e5-8080-005056c00008}\\
  \\Device\\HarddiskVolume2
  H:\\
  \\\\.\\PhysicalDrive0
  \\\\.\\PhysicalDrive0\\Partition1
  /dev/sda  /dev/sda1  /dev/disk/by-uuid/<uuid>  /mnt/usb
  c:\\temp\\drive0.part1.bin

Example: read Master Boot Record
  rawdev -cp \\\\.\\PhysicalDrive0 c:\\temp\\mbr.bin -l 512
Example: backup partition
  rawdev -cp \\\\.\\PhysicalDrive0\\Partition1 c:\\temp\\drive0.part1.bin
Example: restore partition
  rawdev -cp c:\\temp\\drive0.part1.bin \\\\.\\PhysicalDrive0\\Partition1
Example: hide data between MBR and first partition, which happens to start at offset=1048576 so length is forced to be 1048064
  rawdev -cp c:\\temp\\tamtam.bin \\\\.\\PhysicalDrive1 -do 512 -l 1048064

Set RAWDEV_LOG (e.g. RAWDEV_LOG=debug) to control log output.";

/// Legacy single-dash long flags and their clap spelling
const LEGACY_FLAGS: &[(&str, &str)] = &[
    ("-lv", "--lv"),
    ("-lp", "--lp"),
    ("-cp", "--cp"),
    ("-so", "--so"),
    ("-do", "--do"),
    ("-all", "--all"),
];

/// rawdev - raw sector-level copy between disks, partitions, volumes and files
#[derive(Parser, Debug)]
#[command(name = "rawdev")]
#[command(version)]
#[command(about = "Raw copy between disks, partitions, volumes and files", long_about = None)]
#[command(after_help = NAME_EXAMPLES)]
#[command(group(
    ArgGroup::new("command")
        .required(true)
        .multiple(false)
        .args(["list_volumes", "list_partitions", "copy"])
))]
pub struct Cli {
    /// List volumes
    #[arg(long = "lv")]
    pub list_volumes: bool,

    /// Include inaccessible (zero-size) volumes in the listing
    #[arg(short = 'a', long = "all", requires = "list_volumes")]
    pub all: bool,

    /// List physical disks and their partitions
    #[arg(long = "lp")]
    pub list_partitions: bool,

    /// Copy from/to disk, volume, partition or file
    #[arg(long = "cp", num_args = 2, value_names = ["SOURCE", "DEST"])]
    pub copy: Option<Vec<String>>,

    /// Seek the source to this byte offset before copying
    #[arg(long = "so", value_name = "OFFSET", value_parser = parse_number, requires = "copy")]
    pub source_offset: Option<u64>,

    /// Seek the destination to this byte offset before copying
    #[arg(long = "do", value_name = "OFFSET", value_parser = parse_number, requires = "copy")]
    pub destination_offset: Option<u64>,

    /// Number of bytes to copy instead of the source's size
    #[arg(short = 'l', long = "length", value_parser = parse_number, requires = "copy")]
    pub length: Option<u64>,

    /// Enable debug output
    #[arg(short, long)]
    pub verbose: bool,
}

/// What the parsed command line asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ListVolumes { include_all: bool },
    ListPartitions,
    Copy(CopyOptions),
}

impl Cli {
    pub fn action(&self) -> Option<Action> {
        if self.list_volumes {
            return Some(Action::ListVolumes {
                include_all: self.all,
            });
        }
        if self.list_partitions {
            return Some(Action::ListPartitions);
        }

        let [source, destination] = self.copy.as_deref()? else {
            return None;
        };
        let mut options = CopyOptions::new(source.as_str(), destination.as_str());
        options.source_offset = self.source_offset;
        options.destination_offset = self.destination_offset;
        options.length = self.length;
        Some(Action::Copy(options))
    }
}

/// Rewrites the legacy `-lv`/`-cp`/... spellings into clap's `--lv`/`--cp`
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            LEGACY_FLAGS
                .iter()
                .find(|(legacy, _)| arg.to_str() == Some(*legacy))
                .map_or(arg, |(_, modern)| OsString::from(*modern))
        })
        .collect()
}

/// Parses a decimal or `0x`-prefixed hexadecimal byte count
pub fn parse_number(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(normalize_args(
            std::iter::once("rawdev").chain(args.iter().copied()),
        ))
    }

    #[rstest]
    #[case("512", 512)]
    #[case("0x200", 512)]
    #[case("0X1F", 31)]
    #[case("1048064", 1048064)]
    fn test_parse_number(#[case] input: &str, #[case] expected: u64) {
        assert_eq!(parse_number(input), Ok(expected));
    }

    #[rstest]
    #[case("")]
    #[case("-1")]
    #[case("0x")]
    #[case("12k")]
    fn test_parse_number_rejects(#[case] input: &str) {
        assert!(parse_number(input).is_err());
    }

    #[test]
    fn test_normalize_only_exact_legacy_flags() {
        let args = normalize_args(["rawdev", "-cp", "a", "b", "-so", "1", "-l", "2", "-lvx"]);
        assert_eq!(
            args,
            ["rawdev", "--cp", "a", "b", "--so", "1", "-l", "2", "-lvx"]
                .map(OsString::from)
                .to_vec()
        );
    }

    #[test]
    fn test_list_volumes_all() {
        let cli = parse(&["-lv", "-all"]).unwrap();
        assert_eq!(cli.action(), Some(Action::ListVolumes { include_all: true }));

        let cli = parse(&["-lv", "-a"]).unwrap();
        assert_eq!(cli.action(), Some(Action::ListVolumes { include_all: true }));

        let cli = parse(&["-lv"]).unwrap();
        assert_eq!(cli.action(), Some(Action::ListVolumes { include_all: false }));
    }

    #[test]
    fn test_copy_with_adjustments() {
        let cli = parse(&[
            "-cp",
            r"c:\tamtam.bin",
            r"\\.\PhysicalDrive1",
            "-do",
            "512",
            "-l",
            "1048064",
        ])
        .unwrap();
        let expected = CopyOptions::new(r"c:\tamtam.bin", r"\\.\PhysicalDrive1")
            .with_destination_offset(512)
            .with_length(1048064);
        assert_eq!(cli.action(), Some(Action::Copy(expected)));
    }

    #[rstest]
    #[case(&[])]
    #[case(&["-lv", "-lp"])]
    #[case(&["-cp", "only-source"])]
    #[case(&["-so", "512"])]
    #[case(&["-lp", "-l", "512"])]
    #[case(&["-x"])]
    fn test_argument_errors(#[case] args: &[&str]) {
        assert!(parse(args).is_err());
    }

    #[test]
    fn test_help_is_not_an_error_exit() {
        let err = parse(&["-h"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert!(!err.use_stderr());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
