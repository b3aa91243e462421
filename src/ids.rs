//! Correlation identifiers.
//!
//! Every button, select menu, and modal this bot creates carries an opaque
//! string identifier that Discord returns verbatim on the follow-up
//! interaction. The encoding is tagged and versioned so a decode failure is
//! a routing error we can report, never a silent misdispatch.
//!
//! Layout: `v1|handler|<audience>|<command>|<sub>[|arg…]` routes to a named
//! sub-handler of a command; `v1|recovery|<key>` marks the reopen affordance
//! of a buffered modal submission.

use crate::errors::{Error, Result};
use crate::registry::Audience;

const VERSION: &str = "v1";
const SEP: char = '|';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationId {
    /// Routes to a named sub-handler of a command in one audience.
    Handler {
        audience: Audience,
        command: String,
        handler: String,
        /// Extra positional arguments, e.g. a row id carried by a button.
        args: Vec<String>,
    },
    /// Reopen affordance for a captured modal submission.
    Recovery { key: String },
}

impl CorrelationId {
    pub fn handler(audience: Audience, command: &str, handler: &str) -> Self {
        Self::Handler {
            audience,
            command: command.to_string(),
            handler: handler.to_string(),
            args: Vec::new(),
        }
    }

    pub fn handler_with_args(
        audience: Audience,
        command: &str,
        handler: &str,
        args: Vec<String>,
    ) -> Self {
        Self::Handler {
            audience,
            command: command.to_string(),
            handler: handler.to_string(),
            args,
        }
    }

    pub fn recovery(key: &str) -> Self {
        Self::Recovery {
            key: key.to_string(),
        }
    }

    /// Encode to the wire string. Discord caps component identifiers at 100
    /// characters; callers keep args short enough to fit.
    pub fn encode(&self) -> String {
        match self {
            Self::Handler {
                audience,
                command,
                handler,
                args,
            } => {
                let mut out = format!(
                    "{VERSION}{SEP}handler{SEP}{}{SEP}{}{SEP}{}",
                    audience.dir_name(),
                    command,
                    handler
                );
                for arg in args {
                    out.push(SEP);
                    out.push_str(arg);
                }
                out
            }
            Self::Recovery { key } => format!("{VERSION}{SEP}recovery{SEP}{key}"),
        }
    }

    pub fn decode(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(SEP).collect();
        if parts.first() != Some(&VERSION) {
            return Err(Error::Correlation(format!(
                "unsupported identifier version in {:?}",
                raw
            )));
        }
        match parts.get(1) {
            Some(&"handler") => {
                if parts.len() < 5 {
                    return Err(Error::Correlation(format!(
                        "handler identifier needs 5+ fields, got {} in {:?}",
                        parts.len(),
                        raw
                    )));
                }
                let audience = Audience::from_dir_name(parts[2]).ok_or_else(|| {
                    Error::Correlation(format!("unknown audience {:?} in {:?}", parts[2], raw))
                })?;
                if parts[3].is_empty() || parts[4].is_empty() {
                    return Err(Error::Correlation(format!(
                        "empty command or handler field in {:?}",
                        raw
                    )));
                }
                Ok(Self::Handler {
                    audience,
                    command: parts[3].to_string(),
                    handler: parts[4].to_string(),
                    args: parts[5..].iter().map(|s| s.to_string()).collect(),
                })
            }
            Some(&"recovery") => {
                // The key is a full correlation id and may itself contain the
                // separator, so everything after the tag is the key.
                let key = parts[2..].join(&SEP.to_string());
                if key.is_empty() {
                    return Err(Error::Correlation(format!(
                        "recovery identifier needs a non-empty key in {:?}",
                        raw
                    )));
                }
                Ok(Self::Recovery { key })
            }
            other => Err(Error::Correlation(format!(
                "unknown identifier kind {:?} in {:?}",
                other, raw
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_id_round_trips() {
        let id = CorrelationId::handler_with_args(
            Audience::Production,
            "order",
            "claim",
            vec!["17".to_string()],
        );
        let encoded = id.encode();
        assert_eq!(encoded, "v1|handler|production|order|claim|17");
        assert_eq!(CorrelationId::decode(&encoded).unwrap(), id);
    }

    #[test]
    fn recovery_id_round_trips_with_embedded_correlation_id() {
        let id = CorrelationId::recovery("v1|handler|development|order|submit");
        assert_eq!(CorrelationId::decode(&id.encode()).unwrap(), id);

        let flat = CorrelationId::recovery("order-submit-17");
        assert_eq!(CorrelationId::decode(&flat.encode()).unwrap(), flat);
    }

    #[test]
    fn decode_rejects_bad_version() {
        assert!(CorrelationId::decode("v2|handler|production|a|b").is_err());
        assert!(CorrelationId::decode("").is_err());
    }

    #[test]
    fn decode_rejects_wrong_field_counts() {
        assert!(CorrelationId::decode("v1|handler|production|order").is_err());
        assert!(CorrelationId::decode("v1|recovery").is_err());
        assert!(CorrelationId::decode("v1|recovery|").is_err());
        assert!(CorrelationId::decode("v1|teleport|production|a|b").is_err());
    }

    #[test]
    fn decode_rejects_unknown_audience() {
        assert!(CorrelationId::decode("v1|handler|staging|order|submit").is_err());
    }
}
