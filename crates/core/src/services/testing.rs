//! Scripted document sources for service tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::error::{StorageError, StorageResult};
use crate::models::{Customer, CustomerType, Document, Entity};
use crate::ports::{DocumentSource, FetchRequest};
use crate::query::evaluate;

type FailureFn = Box<dyn Fn() -> StorageError + Send + Sync>;

/// In-memory source that counts calls and can be told to fail or hang.
pub(crate) struct ScriptedSource {
    name: &'static str,
    documents: Vec<Document>,
    /// Fail every call from this 1-based call number onwards.
    failure: Option<(usize, FailureFn)>,
    hang: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub(crate) fn new(name: &'static str, documents: Vec<Document>) -> Self {
        Self {
            name,
            documents,
            failure: None,
            hang: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(
        name: &'static str,
        error: impl Fn() -> StorageError + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, Vec::new()).failing_from_call(1, error)
    }

    pub(crate) fn failing_from_call(
        mut self,
        call: usize,
        error: impl Fn() -> StorageError + Send + Sync + 'static,
    ) -> Self {
        self.failure = Some((call, Box::new(error)));
        self
    }

    pub(crate) fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSource for ScriptedSource {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> StorageResult<Vec<Document>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some((from, error)) = &self.failure
            && call >= *from
        {
            return Err(error());
        }
        Ok(evaluate(
            &self.documents,
            request.query,
            request.limit,
            request.start_after,
        ))
    }
}

/// Five wholesalers and three retailers; one retailer has phone 98765432.
pub(crate) fn customers_fixture() -> Vec<Document> {
    let rows = [
        ("c1", "Bharat Wholesale", CustomerType::Wholesaler, None),
        ("c2", "Anand Traders", CustomerType::Wholesaler, None),
        ("c3", "Chawla Retail", CustomerType::Retailer, Some("98765432")),
        ("c4", "Deepak Distributors", CustomerType::Wholesaler, None),
        ("c5", "Arora Kirana", CustomerType::Retailer, Some("91234567")),
        ("c6", "Eastern Supply", CustomerType::Wholesaler, None),
        ("c7", "Chopra Bulk", CustomerType::Wholesaler, None),
        ("c8", "Bansal Store", CustomerType::Retailer, None),
    ];

    rows.iter()
        .enumerate()
        .map(|(i, (id, name, kind, phone))| {
            let created = Utc
                .timestamp_millis_opt(1_700_000_000_000 + i as i64 * 60_000)
                .unwrap();
            let mut customer = Customer::new(*id, *name, *kind, created);
            if let Some(phone) = phone {
                customer = customer.with_phone(*phone);
            }
            customer.to_document().unwrap()
        })
        .collect()
}
