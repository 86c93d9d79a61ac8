//! Strata event store operator tool.
//!
//! ```text
//! strata-admin migrate
//! strata-admin read <stream> [limit]
//! strata-admin count <stream>
//! strata-admin streams-of <event-id>
//! strata-admin delete-stream <stream>
//! ```

use std::error::Error;

use futures::TryStreamExt;
use strata_core::repository::{EventFilter, Repository};
use strata_core::specification::Specification;
use strata_event_store::config::StoreConfig;
use strata_event_store::pg_repository::PgRepository;
use strata_event_store::schema::MIGRATOR;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const USAGE: &str = "usage: strata-admin <migrate | read <stream> [limit] | count <stream> | \
                     streams-of <event-id> | delete-stream <stream>>";

#[derive(Debug, Error, PartialEq, Eq)]
enum UsageError {
    #[error("{}", USAGE)]
    Usage,
    #[error("invalid {what}: {value}")]
    Invalid { what: &'static str, value: String },
}

#[derive(Debug, PartialEq, Eq)]
enum AdminCommand {
    Migrate,
    Read { stream: String, limit: Option<u64> },
    Count { stream: String },
    StreamsOf { event_id: Uuid },
    DeleteStream { stream: String },
}

impl AdminCommand {
    fn parse(args: &[String]) -> Result<Self, UsageError> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["migrate"] => Ok(Self::Migrate),
            ["read", stream] => Ok(Self::Read {
                stream: (*stream).to_owned(),
                limit: None,
            }),
            ["read", stream, limit] => {
                let limit = limit.parse().map_err(|_| UsageError::Invalid {
                    what: "limit",
                    value: (*limit).to_owned(),
                })?;
                Ok(Self::Read {
                    stream: (*stream).to_owned(),
                    limit: Some(limit),
                })
            }
            ["count", stream] => Ok(Self::Count {
                stream: (*stream).to_owned(),
            }),
            ["streams-of", event_id] => {
                let event_id = Uuid::parse_str(event_id).map_err(|_| UsageError::Invalid {
                    what: "event id",
                    value: (*event_id).to_owned(),
                })?;
                Ok(Self::StreamsOf { event_id })
            }
            ["delete-stream", stream] => Ok(Self::DeleteStream {
                stream: (*stream).to_owned(),
            }),
            _ => Err(UsageError::Usage),
        }
    }
}

async fn run(command: AdminCommand, repo: &PgRepository) -> Result<(), Box<dyn Error>> {
    if command == AdminCommand::Migrate {
        MIGRATOR.run(repo.pool()).await?;
        tracing::info!("migrations applied");
        return Ok(());
    }

    let uow = repo.begin().await?;
    match command {
        AdminCommand::Migrate => {}
        AdminCommand::Read { stream, limit } => {
            let mut query = Specification::<_, ()>::new(repo).stream(stream);
            if let Some(limit) = limit {
                query = query.with_limit(limit);
            }
            let mut records = query.records(&uow);
            while let Some(event) = records.try_next().await? {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
        AdminCommand::Count { stream } => {
            let filter = EventFilter {
                stream_name: Some(stream),
                ..EventFilter::default()
            };
            println!("{}", repo.count(&uow, &filter).await?);
        }
        AdminCommand::StreamsOf { event_id } => {
            for stream in repo.streams_of(&uow, event_id).await? {
                println!("{stream}");
            }
        }
        AdminCommand::DeleteStream { stream } => {
            repo.delete_stream(&uow, &stream).await?;
            tracing::info!(%stream, "stream deleted");
        }
    }
    uow.commit().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match AdminCommand::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    // Read configuration from environment.
    let config = StoreConfig::from_env()?;
    let pool = config.connect().await?;
    let repo = config.repository(pool);

    run(command, &repo)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "command failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_parses_every_subcommand() {
        let id = Uuid::new_v4();

        assert_eq!(AdminCommand::parse(&args(&["migrate"])), Ok(AdminCommand::Migrate));
        assert_eq!(
            AdminCommand::parse(&args(&["read", "Bucket$b1", "5"])),
            Ok(AdminCommand::Read {
                stream: "Bucket$b1".to_owned(),
                limit: Some(5)
            })
        );
        assert_eq!(
            AdminCommand::parse(&args(&["count", "Bucket$b1"])),
            Ok(AdminCommand::Count {
                stream: "Bucket$b1".to_owned()
            })
        );
        assert_eq!(
            AdminCommand::parse(&args(&["streams-of", &id.to_string()])),
            Ok(AdminCommand::StreamsOf { event_id: id })
        );
        assert_eq!(
            AdminCommand::parse(&args(&["delete-stream", "Bucket$b1"])),
            Ok(AdminCommand::DeleteStream {
                stream: "Bucket$b1".to_owned()
            })
        );
    }

    #[test]
    fn test_rejects_bad_arguments() {
        assert_eq!(AdminCommand::parse(&args(&[])), Err(UsageError::Usage));
        assert_eq!(
            AdminCommand::parse(&args(&["read", "s", "many"])),
            Err(UsageError::Invalid {
                what: "limit",
                value: "many".to_owned()
            })
        );
        assert!(matches!(
            AdminCommand::parse(&args(&["streams-of", "nope"])),
            Err(UsageError::Invalid { what: "event id", .. })
        ));
    }
}
