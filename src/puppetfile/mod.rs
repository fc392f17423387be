//! Puppetfile parsing.
//!
//! The Puppetfile is a small declarative DSL, one statement per module plus
//! a couple of file-level directives. This parser is deliberately not a
//! Ruby interpreter: it understands the statement forms found in real
//! control repositories and rejects everything else.
//!
//! ```text
//! forge 'https://forgeapi.puppet.com'
//! moduledir 'thirdparty'
//!
//! mod 'puppetlabs/stdlib', '9.4.1'
//! mod 'puppetlabs/apache'
//! mod 'acme/profile',
//!   :git => 'https://git.example.test/acme/profile.git',
//!   :ref => 'v1.2.3'
//! mod 'acme/widgets',
//!   :github_tarball => 'acme/puppet-widgets',
//!   :install_path => 'site'
//! ```
//!
//! Statements may span lines; a trailing comma continues the statement.
//! `#` starts a comment line. A statement the parser cannot make sense of
//! is a hard error, and a broken top-level Puppetfile aborts the whole run.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::core::ParseError;
use crate::module::{
    ForgeModule, GitModule, GithubTarballModule, Module, DEFAULT_FORGE_URL,
};

fn quoted_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^(?:'([^']*)'|"([^"]*)")$"#).unwrap())
}

fn option_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^:([a-z_]+)\s*=>\s*(?:'([^']*)'|"([^"]*)"|:([a-z_]+))$"#).unwrap()
    })
}

fn symbol_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^:([a-z_]+)$").unwrap())
}

/// One assembled statement with its starting line, before interpretation.
struct Statement {
    line: usize,
    text: String,
}

/// Parsed arguments of a `mod` statement.
#[derive(Default)]
struct ModArgs {
    positional: Vec<String>,
    options: HashMap<String, String>,
    bare_symbols: Vec<String>,
}

/// Parse the contents of a Puppetfile into module declarations, in source
/// order.
pub fn parse(path: &Path, contents: &str) -> Result<Vec<Module>, ParseError> {
    let mut forge_url = DEFAULT_FORGE_URL.to_string();
    let mut moduledir: Option<String> = None;
    let mut modules = Vec::new();

    for statement in assemble_statements(contents) {
        let (keyword, rest) = match statement.text.split_once(char::is_whitespace) {
            Some((k, r)) => (k, r.trim()),
            None => (statement.text.as_str(), ""),
        };

        match keyword {
            "forge" => {
                forge_url = single_quoted_arg(path, &statement, rest)?
                    .trim_end_matches('/')
                    .to_string();
            }
            "moduledir" => {
                moduledir = Some(single_quoted_arg(path, &statement, rest)?);
            }
            "mod" => {
                let args = parse_mod_args(path, &statement, rest)?;
                modules.push(build_module(path, &statement, args, &forge_url, &moduledir)?);
            }
            _ => {
                return Err(malformed(path, &statement));
            }
        }
    }

    Ok(modules)
}

/// Join continuation lines (trailing comma) into whole statements and drop
/// comments and blanks.
fn assemble_statements(contents: &str) -> Vec<Statement> {
    let mut statements = Vec::new();
    let mut current: Option<Statement> = None;

    for (idx, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match current.as_mut() {
            Some(stmt) => {
                stmt.text.push(' ');
                stmt.text.push_str(line);
            }
            None => {
                current = Some(Statement {
                    line: idx + 1,
                    text: line.to_string(),
                });
            }
        }

        let continues = current
            .as_ref()
            .is_some_and(|stmt| stmt.text.trim_end().ends_with(','));
        if !continues {
            statements.extend(current.take());
        }
    }

    // A dangling trailing comma at EOF still yields the statement; the
    // argument parser will reject it if it is incomplete.
    statements.extend(current.take());
    statements
}

fn malformed(path: &Path, statement: &Statement) -> ParseError {
    ParseError::MalformedStatement {
        path: path.to_path_buf(),
        line: statement.line,
        statement: statement.text.clone(),
    }
}

fn single_quoted_arg(
    path: &Path,
    statement: &Statement,
    rest: &str,
) -> Result<String, ParseError> {
    quoted_re()
        .captures(rest.trim())
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| malformed(path, statement))
}

fn parse_mod_args(
    path: &Path,
    statement: &Statement,
    rest: &str,
) -> Result<ModArgs, ParseError> {
    let mut args = ModArgs::default();

    for arg in rest.split(',') {
        let arg = arg.trim();
        if arg.is_empty() {
            continue;
        }

        if let Some(caps) = quoted_re().captures(arg) {
            let value = caps.get(1).or_else(|| caps.get(2)).unwrap().as_str();
            args.positional.push(value.to_string());
        } else if let Some(caps) = option_re().captures(arg) {
            let key = caps.get(1).unwrap().as_str().to_string();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .unwrap()
                .as_str()
                .to_string();
            args.options.insert(key, value);
        } else if let Some(caps) = symbol_re().captures(arg) {
            args.bare_symbols.push(caps.get(1).unwrap().as_str().to_string());
        } else {
            return Err(malformed(path, statement));
        }
    }

    Ok(args)
}

fn build_module(
    path: &Path,
    statement: &Statement,
    mut args: ModArgs,
    forge_url: &str,
    moduledir: &Option<String>,
) -> Result<Module, ParseError> {
    if args.positional.is_empty() {
        return Err(malformed(path, statement));
    }
    let name = args.positional.remove(0);
    if crate::module::leaf_name(&name).is_empty() || name.is_empty() {
        return Err(ParseError::InvalidModuleName {
            path: path.to_path_buf(),
            name,
        });
    }

    let install_path = args
        .options
        .remove("install_path")
        .or_else(|| moduledir.clone());

    // `:latest` is an explicit way of saying "unpinned".
    let latest = args.bare_symbols.iter().any(|s| s == "latest");
    let positional_version = args.positional.pop().filter(|_| !latest);

    for key in args.options.keys() {
        if !matches!(
            key.as_str(),
            "git" | "ref" | "tag" | "branch" | "commit" | "github_tarball"
        ) {
            tracing::warn!(
                target: "pupdeploy::puppetfile",
                "{}:{}: ignoring unsupported option :{key}",
                path.display(),
                statement.line
            );
        }
    }

    if let Some(url) = args.options.remove("git") {
        let reference = args
            .options
            .remove("ref")
            .or_else(|| args.options.remove("tag"))
            .or_else(|| args.options.remove("branch"))
            .or_else(|| args.options.remove("commit"));
        return Ok(Module::Git(GitModule::new(
            name,
            url,
            reference,
            install_path,
        )));
    }

    if let Some(repo) = args.options.remove("github_tarball") {
        let version = positional_version.or_else(|| args.options.remove("ref"));
        return Ok(Module::GithubTarball(GithubTarballModule::new(
            name,
            repo,
            version,
            install_path,
        )));
    }

    Ok(Module::Forge(ForgeModule::new(
        name,
        positional_version,
        install_path,
        forge_url,
    )))
}
