//! Deciding whether a command's stderr output means failure.
//!
//! Some tools (docker being the usual one) write progress to stderr on
//! success. A [`StreamClassifier`] picks the policy per command.

/// What stderr output from a command means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StderrPolicy {
    /// Any stderr line fails the command.
    Fail,
    /// stderr is logged; only the exit status counts.
    Log,
}

pub trait StreamClassifier: Send + Sync {
    fn classify(&self, command: &str) -> StderrPolicy;
}

impl<F> StreamClassifier for F
where
    F: Fn(&str) -> StderrPolicy + Send + Sync,
{
    fn classify(&self, command: &str) -> StderrPolicy {
        self(command)
    }
}

/// stderr is chatter for commands that invoke one of `tools`.
///
/// A word matches a tool when its file name equals the tool or starts with
/// `<tool>-`, so `docker` also covers `/usr/bin/docker` and
/// `docker-compose`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolChatter {
    tools: Vec<String>,
}

impl ToolChatter {
    pub fn new<I, S>(tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tools: tools.into_iter().map(Into::into).collect(),
        }
    }

    pub fn tools(&self) -> &[String] {
        &self.tools
    }

    fn matches(&self, word: &str) -> bool {
        let name = word.rsplit('/').next().unwrap_or(word);
        self.tools
            .iter()
            .any(|tool| name == tool || name.strip_prefix(tool.as_str()).is_some_and(|r| r.starts_with('-')))
    }
}

impl Default for ToolChatter {
    fn default() -> Self {
        Self::new(["docker"])
    }
}

impl StreamClassifier for ToolChatter {
    fn classify(&self, command: &str) -> StderrPolicy {
        let invokes_tool = command
            .split(|c: char| c.is_whitespace() || matches!(c, ';' | '&' | '|' | '(' | ')'))
            .filter(|w| !w.is_empty())
            .any(|w| self.matches(w));
        if invokes_tool {
            StderrPolicy::Log
        } else {
            StderrPolicy::Fail
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tolerates_docker() {
        let policy = ToolChatter::default();
        assert_eq!(policy.classify("docker compose up -d"), StderrPolicy::Log);
        assert_eq!(policy.classify("/usr/bin/docker pull app"), StderrPolicy::Log);
        assert_eq!(policy.classify("docker-compose up -d"), StderrPolicy::Log);
        assert_eq!(policy.classify("make build && docker run app"), StderrPolicy::Log);
    }

    #[test]
    fn test_default_fails_others() {
        let policy = ToolChatter::default();
        assert_eq!(policy.classify("./start.sh"), StderrPolicy::Fail);
        assert_eq!(policy.classify("echo dockerfile"), StderrPolicy::Fail);
        assert_eq!(policy.classify("cat mydocker"), StderrPolicy::Fail);
    }

    #[test]
    fn test_configured_tools() {
        let policy = ToolChatter::new(["npm", "pm2"]);
        assert_eq!(policy.classify("npm ci"), StderrPolicy::Log);
        assert_eq!(policy.classify("pm2 reload all"), StderrPolicy::Log);
        assert_eq!(policy.classify("docker compose up"), StderrPolicy::Fail);
    }

    #[test]
    fn test_closure_and_empty_tool_list() {
        let quiet = |_: &str| StderrPolicy::Log;
        assert_eq!(quiet.classify("anything"), StderrPolicy::Log);
        let strict = ToolChatter::new(Vec::<String>::new());
        assert_eq!(strict.classify("docker compose up"), StderrPolicy::Fail);
    }
}
