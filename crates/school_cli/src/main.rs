//! CLI smoke entry point.
//!
//! # Responsibility
//! - Wire configuration, logging, store, rules and a service together.
//! - Keep output deterministic for quick local sanity checks.

use school_core::{
    core_version, init_from_config, open_db_in_memory, open_db_with, CoreConfig, Entity,
    EntityService, JsonMapper, Record, RequestScope, RuleRegistry, ServiceError, ServiceResult,
    Session,
};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Subject {
    #[serde(flatten)]
    record: Record<i64>,
    name: String,
    code: Option<String>,
}

impl Entity for Subject {
    type Key = i64;
    const KIND: &'static str = "subject";

    fn record(&self) -> &Record<i64> {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record<i64> {
        &mut self.record
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("school_cli status=error error={err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let config = CoreConfig::load()?;
    init_from_config(&config)?;

    let conn = match &config.database_path {
        Some(path) => open_db_with(path, config.db_options())?,
        None => open_db_in_memory()?,
    };
    let session = Arc::new(Session::try_new(conn)?);
    let scope = Arc::new(RequestScope::new(
        session,
        "school_cli",
        Arc::new(JsonMapper::new()),
    ));

    let mut registry = RuleRegistry::new();
    registry.register::<Subject>(|rules| {
        rules.property("name", |subject| &subject.name).mandatory();
        rules
            .property("code", |subject| &subject.code)
            .mandatory()
            .duplicate();
    });
    let subjects = EntityService::<Subject>::new(scope, &registry);

    println!("school_core version={}", core_version());

    let without_code = Subject {
        name: "Math".to_string(),
        ..Subject::default()
    };
    report("insert_without_code", subjects.insert(&without_code).await)?;

    let with_code = Subject {
        name: "Math".to_string(),
        code: Some("MATH-101".to_string()),
        ..Subject::default()
    };
    report("insert_with_code", subjects.insert(&with_code).await)?;

    println!("subjects active={}", subjects.get().await?.len());
    Ok(())
}

fn report(step: &str, outcome: ServiceResult<Option<Subject>>) -> Result<(), ServiceError> {
    match outcome {
        Ok(Some(subject)) => println!("{step} status=ok id={}", subject.id()),
        Ok(None) => println!("{step} status=not_saved"),
        Err(ServiceError::Validation(failure)) => println!(
            "{step} status=rejected http={} messages={:?}",
            failure.status().as_u16(),
            failure.messages()
        ),
        Err(err) => return Err(err),
    }
    Ok(())
}
