//! The stdio command protocol.
//!
//! A plugin binary is invoked once per operation with a single argument
//! naming the command. Commands that take configuration receive it as one
//! JSON object on stdin. Output goes to stdout and exit status 0 signals
//! success.
//!
//! | command   | stdout                                   |
//! |-----------|------------------------------------------|
//! | `name`    | raw text                                 |
//! | `usages`  | raw text                                 |
//! | `version` | raw text                                 |
//! | `tags`    | `[a,b,c]` (or a JSON array of strings)   |
//! | `config`  | JSON object of options and attributes    |
//! | `collect` | JSON array of records                    |
//!
//! This module holds both sides: tag parsing used by the host, and
//! [`serve`]/[`run_plugin`] for writing plugin binaries in Rust.

use std::io::{IsTerminal, Write};
use std::process::ExitCode;

use tokio::io::AsyncReadExt;

use super::{Collector, ConfigMap, PluginCommand, PluginError, PluginResult, TagsMode};

/// Parse `tags` output according to `mode`.
pub fn parse_tags(output: &str, mode: TagsMode) -> Result<Vec<String>, serde_json::Error> {
    match mode {
        TagsMode::Structured => serde_json::from_str(output),
        TagsMode::Legacy => Ok(split_bracket_list(output)),
        TagsMode::Auto => serde_json::from_str(output)
            .or_else(|_| Ok(split_bracket_list(output.trim()))),
    }
}

/// Strip leading `[` and trailing `]`, then split on `,`.
///
/// Kept verbatim for existing plugins: nothing is trimmed and `[]` yields a
/// single empty tag.
fn split_bracket_list(output: &str) -> Vec<String> {
    output
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(str::to_string)
        .collect()
}

/// Render tags as a `[a,b,c]` bracket list, readable in every tags mode
/// except `Structured`.
fn bracket_list(tags: &[String]) -> String {
    format!("[{}]", tags.join(","))
}

/// Parse a configuration blob read from stdin. Blank input means none.
pub fn parse_input(input: &[u8]) -> PluginResult<Option<ConfigMap>> {
    if input.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    serde_json::from_slice(input)
        .map(Some)
        .map_err(|e| PluginError::Config(format!("invalid configuration on stdin: {e}")))
}

/// Run one protocol command against an in-process collector.
///
/// Configuration supplied for a config-accepting command is applied with
/// `sync_config` first. Returns the bytes to write to stdout.
pub async fn serve(
    collector: &dyn Collector,
    command: PluginCommand,
    input: Option<ConfigMap>,
) -> PluginResult<Vec<u8>> {
    if let Some(config) = input {
        if command.accepts_config() {
            collector.sync_config(config).await?;
        }
    }

    let output = match command {
        PluginCommand::Name => collector.name().await?.into_bytes(),
        PluginCommand::Usages => collector.usages().await?.into_bytes(),
        PluginCommand::Version => collector.version().await?.into_bytes(),
        PluginCommand::Tags => bracket_list(&collector.tags().await?).into_bytes(),
        PluginCommand::Config => to_json(&collector.config().await?)?,
        PluginCommand::Collect => to_json(&collector.collect().await?)?,
    };

    Ok(output)
}

fn to_json<T: serde::Serialize>(value: &T) -> PluginResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| PluginError::Io(e.into()))
}

/// Help text printed when a plugin binary gets no or an unknown command.
pub fn usage_text(program: &str) -> String {
    format!(
        "{program} is a metric collector plugin.

Usage:

\t{program} command

The commands are:
\tname        print the collector name
\tusages      print the collector description
\ttags        print the collector tags
\tconfig      print configurable options
\tcollect     collect metrics (configuration is read from stdin)
\tversion     print the plugin version
"
    )
}

/// Entry point for plugin binaries.
///
/// Reads the command from the process arguments and configuration from
/// stdin, writes the response to stdout and maps failures to a non-zero
/// exit status with the error on stderr.
pub async fn run_plugin(collector: &dyn Collector) -> ExitCode {
    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "plugin".to_string());

    let Some(arg) = args.next() else {
        print!("{}", usage_text(&program));
        return ExitCode::SUCCESS;
    };

    let command = match arg.parse::<PluginCommand>() {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e}\n\n{}", usage_text(&program));
            return ExitCode::from(2);
        }
    };

    let result = async {
        let input = if command.accepts_config() && !std::io::stdin().is_terminal() {
            let mut raw = Vec::new();
            tokio::io::stdin().read_to_end(&mut raw).await?;
            parse_input(&raw)?
        } else {
            None
        };
        serve(collector, command, input).await
    }
    .await;

    match result {
        Ok(output) => {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = stdout.write_all(&output).and_then(|()| stdout.flush()) {
                eprintln!("failed to write output: {e}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{command} failed: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::NativeCollector;

    fn tags(output: &str, mode: TagsMode) -> Vec<String> {
        parse_tags(output, mode).unwrap()
    }

    #[test]
    fn test_legacy_tags_split() {
        assert_eq!(tags("[cpu,mem,disk]", TagsMode::Legacy), vec!["cpu", "mem", "disk"]);
    }

    #[test]
    fn test_legacy_empty_list_yields_single_empty_tag() {
        assert_eq!(tags("[]", TagsMode::Legacy), vec![""]);
    }

    #[test]
    fn test_legacy_does_not_trim() {
        assert_eq!(tags("[a, b]\n", TagsMode::Legacy), vec!["a", " b]\n"]);
        assert_eq!(tags("[[x]]", TagsMode::Legacy), vec!["x"]);
    }

    #[test]
    fn test_structured_tags() {
        assert_eq!(tags(r#"["cpu","mem"]"#, TagsMode::Structured), vec!["cpu", "mem"]);
        assert!(tags("[]", TagsMode::Structured).is_empty());
        assert!(parse_tags("[cpu,mem]", TagsMode::Structured).is_err());
    }

    #[test]
    fn test_auto_tags_prefers_json() {
        assert!(tags("[]", TagsMode::Auto).is_empty());
        assert_eq!(tags("[\"a,b\"]\n", TagsMode::Auto), vec!["a,b"]);
        assert_eq!(tags("[cpu,mem,disk]\n", TagsMode::Auto), vec!["cpu", "mem", "disk"]);
    }

    #[test]
    fn test_parse_input() {
        assert!(parse_input(b"").unwrap().is_none());
        assert!(parse_input(b"  \n").unwrap().is_none());

        let config = parse_input(br#"{"dsn":"x"}"#).unwrap().unwrap();
        assert_eq!(config["dsn"], "x");

        assert!(matches!(parse_input(b"[1,2]"), Err(PluginError::Config(_))));
    }

    #[test]
    fn test_usage_lists_every_command() {
        let usage = usage_text("orakit");
        assert!(usage.starts_with("orakit is a metric collector plugin."));
        for command in PluginCommand::ALL {
            assert!(usage.contains(command.as_str()), "missing {command}");
        }
    }

    fn echo_collector() -> NativeCollector {
        NativeCollector::builder("echo")
            .usages("echoes its configuration")
            .tags(["demo", "echo"])
            .collect_with(|config| Ok(vec![config.clone()]))
            .build()
    }

    #[tokio::test]
    async fn test_serve_text_commands() {
        let collector = echo_collector();
        assert_eq!(serve(&collector, PluginCommand::Name, None).await.unwrap(), b"echo");
        assert_eq!(
            serve(&collector, PluginCommand::Usages, None).await.unwrap(),
            b"echoes its configuration"
        );
    }

    #[tokio::test]
    async fn test_serve_tags_as_bracket_list() {
        let collector = echo_collector();
        let output = serve(&collector, PluginCommand::Tags, None).await.unwrap();
        assert_eq!(output, b"[demo,echo]");

        let text = String::from_utf8(output).unwrap();
        assert_eq!(tags(&text, TagsMode::default()), vec!["demo", "echo"]);
        assert_eq!(tags(&text, TagsMode::Auto), vec!["demo", "echo"]);
    }

    #[tokio::test]
    async fn test_serve_collect_applies_input() {
        let collector = echo_collector();
        let input = parse_input(br#"{"k":"v"}"#).unwrap();

        let output = serve(&collector, PluginCommand::Collect, input).await.unwrap();
        assert_eq!(output, br#"[{"k":"v"}]"#);
    }

    #[tokio::test]
    async fn test_serve_ignores_input_for_name() {
        let collector = echo_collector();
        let input = parse_input(br#"{"k":"v"}"#).unwrap();
        serve(&collector, PluginCommand::Name, input).await.unwrap();

        let output = serve(&collector, PluginCommand::Collect, None).await.unwrap();
        assert_eq!(output, b"[{}]");
    }
}
