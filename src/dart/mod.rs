// src/dart/mod.rs
//! Remote registry fallback for records local extraction could not fill.

pub mod client;
pub mod models;

pub use client::{FactsApi, OpenDartClient};

use crate::amount::normalize_amount;
use crate::context::RunContext;
use crate::model::{Diagnostic, StatementRecord, Strategy, UnitMultiplier};
use crate::utils::error::RemoteError;

/// Fills an empty record from the remote key-accounts API. Only unset fields
/// are written. Any failure (unknown company, timeout, API error) leaves the
/// record unchanged apart from a `RemoteUnavailable` diagnostic.
/// Returns the number of fields added.
pub async fn enhance_with_remote<A: FactsApi>(record: &mut StatementRecord, api: &A, ctx: &RunContext) -> usize {
    if !record.is_empty() {
        tracing::debug!("{} {} already has fields; remote fallback skipped", record.company, record.fiscal_year);
        return 0;
    }

    match fetch(record, api, ctx).await {
        Ok(added) => {
            tracing::info!("Remote fallback filled {} fields for {} {}", added, record.company, record.fiscal_year);
            record.diagnostics.push(Diagnostic::RemoteEnhanced { fields: added });
            added
        }
        Err(e) => {
            tracing::warn!("Remote fallback unavailable for {}: {}", record.company, e);
            record.diagnostics.push(Diagnostic::RemoteUnavailable { reason: e.to_string() });
            0
        }
    }
}

async fn fetch<A: FactsApi>(record: &mut StatementRecord, api: &A, ctx: &RunContext) -> Result<usize, RemoteError> {
    let corp_code = ctx
        .companies
        .corp_code(&record.company)
        .ok_or_else(|| RemoteError::UnknownCompany(record.company.clone()))?;

    let accounts = tokio::time::timeout(ctx.config.remote_timeout(), api.key_accounts(corp_code, record.fiscal_year))
        .await
        .map_err(|_| RemoteError::Timeout)??;

    let mut added = 0;
    for account in accounts {
        if account.consolidation() != Some(record.consolidation) {
            continue;
        }
        let Some(field) = ctx.dictionary.remote_field(&account.account_nm) else {
            tracing::trace!("No field for remote account '{}'", account.account_nm);
            continue;
        };
        if record.fields.contains_key(field) {
            continue;
        }
        let Some(value) = account
            .thstrm_amount
            .as_deref()
            .and_then(|raw| normalize_amount(raw, UnitMultiplier::Base))
        else {
            continue;
        };
        record.fields.insert(field.to_string(), value);
        record.sources.insert(field.to_string(), Strategy::RemoteApi);
        added += 1;
    }
    Ok(added)
}
