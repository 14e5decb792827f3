//! Registered command table

use std::collections::BTreeMap;
use std::fmt;

use super::CommandError;
use super::expr::Call;

/// A remote command over a device context
pub type Handler<D> = fn(&mut D, &[String]) -> Result<String, CommandError>;

struct Entry<D> {
    help: &'static str,
    handler: Handler<D>,
}

/// Name to handler mapping for one device type
///
/// `help` is always available and lists the registered names.
pub struct CommandTable<D> {
    entries: BTreeMap<&'static str, Entry<D>>,
}

impl<D> Default for CommandTable<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for CommandTable<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTable")
            .field("commands", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<D> CommandTable<D> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Register a command, replacing any earlier one with the same name
    #[must_use]
    pub fn with(mut self, name: &'static str, help: &'static str, handler: Handler<D>) -> Self {
        self.entries.insert(name, Entry { help, handler });
        self
    }

    /// Whether a name is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        name == "help" || self.entries.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    /// One line per command
    #[must_use]
    pub fn help_text(&self) -> String {
        let mut lines = vec!["help - list commands".to_string()];
        lines.extend(
            self.entries
                .iter()
                .map(|(name, entry)| format!("{name} - {}", entry.help)),
        );
        lines.join("\n")
    }

    /// Parse and run one expression against the device
    ///
    /// # Errors
    ///
    /// Returns the parse error, [`CommandError::Unknown`] for an unregistered
    /// name, or whatever the handler returns
    pub fn eval(&self, device: &mut D, expr: &str) -> Result<String, CommandError> {
        let call = Call::parse(expr)?;
        if call.name == "help" {
            return Ok(self.help_text());
        }
        let entry = self
            .entries
            .get(call.name.as_str())
            .ok_or_else(|| CommandError::Unknown(call.name.clone()))?;
        (entry.handler)(device, &call.args)
    }
}

/// Reject calls that pass arguments to a command taking none
///
/// # Errors
///
/// Returns [`CommandError::Arguments`] when `args` is not empty
pub fn no_args(args: &[String]) -> Result<(), CommandError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(CommandError::Arguments(format!(
            "expected no arguments, got {}",
            args.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        value: i64,
    }

    fn table() -> CommandTable<Counter> {
        CommandTable::<Counter>::new()
            .with("get", "current value", |c, args| {
                no_args(args)?;
                Ok(c.value.to_string())
            })
            .with("add", "add(n)", |c, args| {
                let [n] = args else {
                    return Err(CommandError::Arguments("add takes one number".to_string()));
                };
                let n: i64 = n
                    .parse()
                    .map_err(|_| CommandError::Arguments(format!("not a number: {n}")))?;
                c.value += n;
                Ok(c.value.to_string())
            })
    }

    #[test]
    fn handlers_mutate_the_context() {
        let t = table();
        let mut c = Counter::default();
        assert_eq!(t.eval(&mut c, "add(5)").unwrap(), "5");
        assert_eq!(t.eval(&mut c, "add('2')").unwrap(), "7");
        assert_eq!(t.eval(&mut c, "get").unwrap(), "7");
    }

    #[test]
    fn errors_are_typed() {
        let t = table();
        let mut c = Counter::default();
        assert!(matches!(
            t.eval(&mut c, "launch()"),
            Err(CommandError::Unknown(_))
        ));
        assert!(matches!(
            t.eval(&mut c, "add(x)"),
            Err(CommandError::Arguments(_))
        ));
        assert!(matches!(
            t.eval(&mut c, "get(1)"),
            Err(CommandError::Arguments(_))
        ));
        assert!(matches!(t.eval(&mut c, "get("), Err(CommandError::Parse(_))));
    }

    #[test]
    fn help_lists_registered_names() {
        let t = table();
        let help = t.eval(&mut Counter::default(), "help()").unwrap();
        assert!(help.contains("add - add(n)"));
        assert!(help.contains("get - current value"));
        assert!(t.contains("help"));
        assert_eq!(t.names().collect::<Vec<_>>(), vec!["add", "get"]);
    }
}
