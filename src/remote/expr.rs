//! Remote command text parsing

use super::CommandError;

const TARGET_SEPARATOR: &str = "->";

/// Shape of an Admin command, chosen by the `->` separator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    /// `expr -> target`: only the named device (or `all`) evaluates and replies
    Targeted { expr: String, target: String },
    /// bare `expr`: every device evaluates, nobody replies
    Broadcast { expr: String },
}

impl RemoteCommand {
    /// Split raw command text on the first `->`
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(TARGET_SEPARATOR) {
            Some((expr, target)) => Self::Targeted {
                expr: expr.trim().to_string(),
                target: target.trim().to_string(),
            },
            None => Self::Broadcast {
                expr: raw.trim().to_string(),
            },
        }
    }

    #[must_use]
    pub fn expr(&self) -> &str {
        match self {
            Self::Targeted { expr, .. } | Self::Broadcast { expr } => expr,
        }
    }

    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Targeted { target, .. } => Some(target),
            Self::Broadcast { .. } => None,
        }
    }
}

/// A parsed `name(arg, ...)` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub name: String,
    pub args: Vec<String>,
}

impl Call {
    /// Parse `name`, `name()` or `name(a, "b c", 'd')`
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Parse`] for an empty name, unbalanced
    /// parentheses or an unterminated quote
    pub fn parse(expr: &str) -> Result<Self, CommandError> {
        let expr = expr.trim().trim_end_matches(';').trim_end();
        let (name, rest) = match expr.find('(') {
            Some(open) => (&expr[..open], Some(&expr[open + 1..])),
            None => (expr, None),
        };

        let name = name.trim();
        if name.is_empty() {
            return Err(CommandError::Parse("empty command".to_string()));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(CommandError::Parse(format!("invalid command name '{name}'")));
        }

        let args = match rest {
            None => Vec::new(),
            Some(rest) => {
                let Some(inner) = rest.strip_suffix(')') else {
                    return Err(CommandError::Parse(format!("missing ')' in '{expr}'")));
                };
                split_args(inner)?
            }
        };

        Ok(Self {
            name: name.to_string(),
            args,
        })
    }
}

fn split_args(inner: &str) -> Result<Vec<String>, CommandError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut quoted = false;

    for c in inner.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                quoted = true;
            }
            (None, ',') => {
                args.push(std::mem::take(&mut current).trim().to_string());
                quoted = false;
            }
            (None, c) => current.push(c),
        }
    }

    if quote.is_some() {
        return Err(CommandError::Parse("unterminated quote".to_string()));
    }

    let last = current.trim();
    if !last.is_empty() || quoted || !args.is_empty() {
        args.push(last.to_string());
    }
    Ok(args)
}
