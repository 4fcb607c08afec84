//! Individual risk matchers.
//!
//! Matchers work on a whitespace-tokenized view of a single line. They are
//! lexical on purpose: quoting does not hide a dangerous substring, and a
//! trailing comment does not disable detection.

use super::types::codes;
use vectra_guard_core::Severity;

/// A matcher hit, before it becomes a [`super::Finding`].
pub(crate) struct RuleHit {
    pub code: &'static str,
    pub severity: Severity,
    pub description: String,
    pub recommendation: String,
}

impl RuleHit {
    fn new(
        code: &'static str,
        severity: Severity,
        description: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            code,
            severity,
            description: description.into(),
            recommendation: recommendation.into(),
        }
    }
}

const PROTECTED_ROOTS: &[&str] = &[
    "/bin", "/boot", "/etc", "/lib", "/proc", "/sbin", "/sys", "/usr", "/var",
];

const HOME_TARGETS: &[&str] = &["~", "~/*", "$HOME", "$HOME/*", "${HOME}", "${HOME}/*"];

struct RmInvocation {
    recursive: bool,
    no_preserve_root: bool,
    targets: Vec<String>,
}

fn strip_quotes(token: &str) -> &str {
    token.trim_matches(|c| matches!(c, '"' | '\'' | ';' | '(' | ')'))
}

fn parse_rm(tokens: &[&str]) -> Option<RmInvocation> {
    let pos = tokens
        .iter()
        .position(|t| *t == "rm" || t.ends_with("/rm"))?;

    let mut recursive = false;
    let mut no_preserve_root = false;
    let mut targets = Vec::new();
    for token in &tokens[pos + 1..] {
        if *token == "--no-preserve-root" {
            no_preserve_root = true;
        } else if *token == "--recursive" {
            recursive = true;
        } else if token.starts_with("--") {
            // other long flag, ignore
        } else if let Some(cluster) = token.strip_prefix('-') {
            if cluster.contains('r') || cluster.contains('R') {
                recursive = true;
            }
        } else {
            targets.push(strip_quotes(token).to_string());
        }
    }
    Some(RmInvocation {
        recursive,
        no_preserve_root,
        targets,
    })
}

/// `rm -r` against `/`, `/*`, `/ *`, or a protected system prefix; or any
/// `rm --no-preserve-root`.
pub(crate) fn match_delete_root(tokens: &[&str]) -> Option<RuleHit> {
    let rm = parse_rm(tokens)?;
    let dangerous_target = rm.targets.iter().any(|t| {
        t == "/" || t == "/*" || PROTECTED_ROOTS.iter().any(|root| t.starts_with(root))
    });
    if rm.no_preserve_root || (rm.recursive && dangerous_target) {
        return Some(RuleHit::new(
            codes::DANGEROUS_DELETE_ROOT,
            Severity::Critical,
            "Recursive delete targeting the filesystem root or a system directory",
            "Name the exact files to remove, never a system root",
        ));
    }
    None
}

/// `rm -r` against the home directory.
pub(crate) fn match_delete_home(tokens: &[&str]) -> Option<RuleHit> {
    let rm = parse_rm(tokens)?;
    if rm.recursive
        && rm
            .targets
            .iter()
            .any(|t| HOME_TARGETS.contains(&t.as_str()))
    {
        return Some(RuleHit::new(
            codes::DANGEROUS_DELETE_HOME,
            Severity::High,
            "Recursive delete targeting the home directory",
            "Delete specific subdirectories instead of the whole home",
        ));
    }
    None
}

/// The classic `:(){ :|:& };:` and any rename of it: a function whose body
/// pipes itself into itself in the background, invoked right after.
pub(crate) fn match_fork_bomb(line: &str) -> Option<RuleHit> {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    let def = compact.find("(){")?;
    let name: String = compact[..def]
        .chars()
        .rev()
        .take_while(|c| !";&|{}()".contains(*c))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if name.is_empty() {
        return None;
    }
    let rest = &compact[def + 3..];
    let close = rest.find("};")?;
    let body = &rest[..close];
    let tail = &rest[close + 2..];
    if body.contains(&format!("{name}|{name}&")) && tail.starts_with(name.as_str()) {
        return Some(RuleHit::new(
            codes::FORK_BOMB,
            Severity::Critical,
            "Fork bomb: self-replicating background function",
            "Never run this; it exhausts the process table",
        ));
    }
    None
}

/// Network fetch piped straight into a shell.
pub(crate) fn match_pipe_to_shell(line: &str, re: &regex::Regex) -> Option<RuleHit> {
    if re.is_match(line) {
        return Some(RuleHit::new(
            codes::PIPE_TO_SHELL,
            Severity::High,
            "Remote content piped directly into a shell",
            "Download to a file, inspect it, then run it",
        ));
    }
    None
}

/// `sudo` with no concrete command: bare, flags-only, or launching a shell.
pub(crate) fn match_sudo_unrestricted(tokens: &[&str]) -> Option<RuleHit> {
    let pos = tokens.iter().position(|t| *t == "sudo")?;
    let command = tokens[pos + 1..]
        .iter()
        .find(|t| !t.starts_with('-'))
        .copied();
    let unrestricted = match command {
        None => true,
        Some(cmd) => matches!(cmd, "sh" | "bash" | "zsh" | "su"),
    };
    if unrestricted {
        return Some(RuleHit::new(
            codes::SUDO_UNRESTRICTED,
            Severity::Medium,
            "sudo without a specific command grants an unrestricted root shell",
            "Run sudo with the exact command it is needed for",
        ));
    }
    None
}

/// `git push --force` / `-f` (gated by `block_force_git`).
pub(crate) fn match_force_git_push(tokens: &[&str]) -> Option<RuleHit> {
    let git = tokens.iter().position(|t| *t == "git")?;
    let rest = &tokens[git + 1..];
    if rest.iter().any(|t| *t == "push") && rest.iter().any(|t| *t == "--force" || *t == "-f") {
        return Some(RuleHit::new(
            codes::FORCE_GIT_PUSH,
            Severity::High,
            "Force push rewrites remote history",
            "Prefer --force-with-lease, or avoid rewriting shared branches",
        ));
    }
    None
}

pub(crate) struct SqlPatterns {
    pub drop_database: regex::Regex,
    pub truncate: regex::Regex,
    pub delete_from: regex::Regex,
    pub where_clause: regex::Regex,
}

impl SqlPatterns {
    pub fn compile() -> Self {
        Self {
            drop_database: regex::Regex::new(r"(?i)\bdrop\s+database\b").unwrap(),
            truncate: regex::Regex::new(r"(?i)\btruncate\b").unwrap(),
            delete_from: regex::Regex::new(r"(?i)\bdelete\s+from\b").unwrap(),
            where_clause: regex::Regex::new(r"(?i)\bwhere\b").unwrap(),
        }
    }
}

/// `DROP DATABASE`, `TRUNCATE`, and unscoped `DELETE FROM`.
///
/// With `only_destructive_sql`, a `DELETE FROM … WHERE …` is considered
/// scoped and does not fire; without it, every `DELETE FROM` fires.
pub(crate) fn match_destructive_sql(
    line: &str,
    sql: &SqlPatterns,
    only_destructive: bool,
) -> Option<RuleHit> {
    let fired = sql.drop_database.is_match(line)
        || sql.truncate.is_match(line)
        || (sql.delete_from.is_match(line)
            && (!only_destructive || !sql.where_clause.is_match(line)));
    if fired {
        return Some(RuleHit::new(
            codes::DESTRUCTIVE_SQL,
            Severity::High,
            "Destructive SQL statement",
            "Scope deletions with a WHERE clause and back up first",
        ));
    }
    None
}

/// Production keyword on the line, or a git operation naming a production
/// branch (the latter gated by `monitor_git_ops`).
pub(crate) fn match_prod_env_touch(
    line: &str,
    tokens: &[&str],
    keywords: &[String],
    branches: &[String],
    detect_keywords: bool,
    monitor_git_ops: bool,
) -> Option<RuleHit> {
    let lower = line.to_lowercase();
    if detect_keywords {
        if let Some(keyword) = keywords.iter().find(|k| lower.contains(k.as_str())) {
            return Some(RuleHit::new(
                codes::PROD_ENV_TOUCH,
                Severity::Medium,
                format!("Command references production indicator '{}'", keyword),
                "Double-check the target environment before running",
            ));
        }
    }
    if monitor_git_ops && tokens.contains(&"git") {
        if let Some(branch) = branches.iter().find(|b| tokens.contains(&b.as_str())) {
            return Some(RuleHit::new(
                codes::PROD_ENV_TOUCH,
                Severity::Medium,
                format!("Git operation touches production branch '{}'", branch),
                "Use a feature branch and open a pull request",
            ));
        }
    }
    None
}

/// A `.env` (or `.env.*`) file appearing as a path token.
pub(crate) fn match_dotenv_read(tokens: &[&str]) -> Option<RuleHit> {
    let hit = tokens.iter().map(|t| strip_quotes(t)).any(|t| {
        t == ".env"
            || t.starts_with(".env.")
            || t.ends_with("/.env")
            || t.contains("/.env.")
    });
    if hit {
        return Some(RuleHit::new(
            codes::DOTENV_FILE_READ,
            Severity::High,
            "Access to a dotenv file that may hold credentials",
            "Keep secrets out of command lines; use the env protection layer",
        ));
    }
    None
}

pub(crate) struct SensitiveEnvPatterns {
    pub var_ref: regex::Regex,
    pub printenv: regex::Regex,
}

impl SensitiveEnvPatterns {
    pub fn compile() -> Self {
        Self {
            var_ref: regex::Regex::new(
                r"(?i)\$\{?[a-z0-9_]*(?:token|secret|key|password)[a-z0-9_]*",
            )
            .unwrap(),
            printenv: regex::Regex::new(
                r"(?i)\bprintenv\b.*(?:token|secret|key|password)",
            )
            .unwrap(),
        }
    }
}

/// Expansion or dump of a credential-looking environment variable.
pub(crate) fn match_sensitive_env(line: &str, pat: &SensitiveEnvPatterns) -> Option<RuleHit> {
    if pat.var_ref.is_match(line) || pat.printenv.is_match(line) {
        return Some(RuleHit::new(
            codes::SENSITIVE_ENV_ACCESS,
            Severity::High,
            "Access to a credential-bearing environment variable",
            "Avoid expanding secrets on command lines; they end up in logs",
        ));
    }
    None
}

pub(crate) struct DevicePatterns {
    pub dd_of_device: regex::Regex,
    pub mkfs_device: regex::Regex,
}

impl DevicePatterns {
    pub fn compile() -> Self {
        Self {
            dd_of_device: regex::Regex::new(r"(?i)\bdd\b[^;|&]*\bof=/dev/\S+").unwrap(),
            mkfs_device: regex::Regex::new(r"(?i)\bmkfs(?:\.[a-z0-9]+)?\b[^;|&]*\s/dev/\S+")
                .unwrap(),
        }
    }
}

/// Raw writes to block devices.
pub(crate) fn match_device_write(line: &str, pat: &DevicePatterns) -> Option<RuleHit> {
    if pat.dd_of_device.is_match(line) || pat.mkfs_device.is_match(line) {
        return Some(RuleHit::new(
            codes::DEVICE_WRITE,
            Severity::Critical,
            "Direct write to a block device",
            "Device writes destroy data irrecoverably; verify the target device",
        ));
    }
    None
}
