//! Configuration files driving window defaults.

use cepline_runtime::config::{Config, ConfigError};
use cepline_runtime::factory;
use cepline_runtime::stream::Collector;
use cepline_runtime::window::{tumbling_count_window, FlushPolicy};
use std::io::Write;

fn write_config(extension: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(extension)
        .tempfile()
        .expect("create temp config");
    file.write_all(content.as_bytes()).expect("write temp config");
    file
}

#[test]
fn load_yaml_by_extension() {
    let file = write_config(
        ".yaml",
        "windows:\n  flush_on_complete: emit_partial\n  max_open_intervals: 8\nlogging:\n  level: warn\n",
    );
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.windows.flush_on_complete, FlushPolicy::EmitPartial);
    assert_eq!(config.windows.max_open_intervals, Some(8));
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.logging.format, "text");
}

#[test]
fn load_toml_by_extension() {
    let file = write_config(
        ".toml",
        "[windows]\nflush_on_complete = \"discard\"\n\n[logging]\nformat = \"json\"\ntimestamps = false\n",
    );
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.windows.flush_on_complete, FlushPolicy::Discard);
    assert_eq!(config.logging.format, "json");
    assert!(!config.logging.timestamps);
}

#[test]
fn unknown_extension_tries_both_formats() {
    let file = write_config(".conf", "[windows]\nmax_open_intervals = 3\n");
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.windows.max_open_intervals, Some(3));
}

#[test]
fn missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yaml");
    match Config::load(&path) {
        Err(ConfigError::IoError(reported, _)) => assert_eq!(reported, path),
        other => panic!("expected an io error, got {other:?}"),
    }
}

#[test]
fn malformed_file_is_a_parse_error() {
    let file = write_config(".yaml", "windows: [not, a, map");
    assert!(matches!(Config::load(file.path()), Err(ConfigError::ParseError(_))));
}

#[test]
fn example_files_round_trip() {
    assert_eq!(Config::from_yaml(&Config::example_yaml()).unwrap(), Config::example());
    assert_eq!(Config::from_toml(&Config::example_toml()).unwrap(), Config::example());
}

#[test]
fn loaded_flush_policy_applies_to_windows() {
    let file = write_config(".yml", "windows:\n  flush_on_complete: emit_partial\n");
    let config = Config::load(file.path()).unwrap();

    let out = Collector::new();
    factory::of([1, 2, 3, 4, 5])
        .pipe(tumbling_count_window(2).unwrap().with_config(&config.windows))
        .subscribe(out.observer());
    let sizes: Vec<usize> = out
        .values()
        .iter()
        .filter_map(|item| item.as_window().map(<[_]>::len))
        .collect();
    assert_eq!(sizes, vec![2, 2, 1]);
}
