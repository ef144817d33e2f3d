//! Clap command definition.

use clap::{Arg, ArgAction, Command};

/// Build the `fsjournal-dump` command.
pub fn build_cli() -> Command {
    Command::new("fsjournal-dump")
        .about("Print the events recorded in a filesystem operation journal")
        .arg(
            Arg::new("dir")
                .long("dir")
                .short('d')
                .help("Log directory (default: fdl)")
                .default_value("fdl"),
        )
        .arg(
            Arg::new("ident")
                .long("ident")
                .short('i')
                .help("Journal identifier (default: fubar)")
                .default_value("fubar"),
        )
        .arg(
            Arg::new("term")
                .long("term")
                .short('t')
                .help("Only dump this term")
                .value_parser(clap::value_parser!(u64))
                .conflicts_with("meta"),
        )
        .arg(
            Arg::new("list")
                .long("list")
                .help("List the terms on disk and exit")
                .action(ArgAction::SetTrue)
                .conflicts_with("meta"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("JSON output mode")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("More logging on stderr; repeat for trace output")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("meta")
                .help("Metadata segment to read instead of scanning --dir")
                .requires("data"),
        )
        .arg(Arg::new("data").help("Data segment paired with META"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let m = build_cli().try_get_matches_from(["fsjournal-dump"]).unwrap();
        assert_eq!(m.get_one::<String>("dir").unwrap(), "fdl");
        assert_eq!(m.get_one::<String>("ident").unwrap(), "fubar");
        assert!(m.get_one::<u64>("term").is_none());
        assert_eq!(m.get_count("verbose"), 0);
    }

    #[test]
    fn test_explicit_files() {
        let m = build_cli()
            .try_get_matches_from(["fsjournal-dump", "--json", "a.jnl", "b.jnl"])
            .unwrap();
        assert!(m.get_flag("json"));
        assert_eq!(m.get_one::<String>("meta").unwrap(), "a.jnl");
        assert_eq!(m.get_one::<String>("data").unwrap(), "b.jnl");
    }

    #[test]
    fn test_meta_requires_data() {
        assert!(build_cli()
            .try_get_matches_from(["fsjournal-dump", "a.jnl"])
            .is_err());
    }

    #[test]
    fn test_term_conflicts_with_files() {
        assert!(build_cli()
            .try_get_matches_from(["fsjournal-dump", "--term", "2", "a.jnl", "b.jnl"])
            .is_err());
    }

    #[test]
    fn test_term_parses_number() {
        let m = build_cli()
            .try_get_matches_from(["fsjournal-dump", "-t", "7", "-vv"])
            .unwrap();
        assert_eq!(m.get_one::<u64>("term"), Some(&7));
        assert_eq!(m.get_count("verbose"), 2);
    }
}
