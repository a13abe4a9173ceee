//! Transaction-scoped working set for the core engines
//!
//! A snapshot loads the product structure reachable from a root, the
//! classifications and the locked balance rows it touches. The pure engines
//! run against it in memory and the resulting events are written back as
//! deltas on the same connection.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgConnection;

use crate::error::AppResult;
use crate::models::MovementEvent;
use crate::services::store;
use shared::bom::{classification_of, Catalog};
use shared::ledger::StockLedger;
use shared::unification::CodeUnifier;

pub struct Snapshot {
    pub catalog: Catalog,
    pub ledger: StockLedger,
}

/// Product structure reachable from one root, with classifications
pub struct Structure {
    pub unifier: CodeUnifier,
    pub catalog: Catalog,
    /// Every code reached, aliases included, in code order
    pub codes: Vec<String>,
}

impl Structure {
    /// Walk active links breadth-first from `root_code`, following every
    /// alias of each code reached
    pub async fn load(conn: &mut PgConnection, root_code: &str) -> AppResult<Self> {
        let unifier = store::load_unifier(conn).await?;
        let mut catalog = Catalog::new();

        let mut reached: BTreeSet<String> = unifier.resolve(root_code);
        let mut frontier: Vec<String> = reached.iter().cloned().collect();
        while !frontier.is_empty() {
            let links = store::fetch_active_links(conn, &frontier).await?;
            frontier.clear();
            for link in links {
                for code in unifier.resolve(&link.component_product_code) {
                    if reached.insert(code.clone()) {
                        frontier.push(code);
                    }
                }
                catalog.insert_link(link);
            }
        }

        let codes: Vec<String> = reached.into_iter().collect();
        for classification in store::fetch_classifications(conn, &codes).await? {
            catalog.add_product(classification);
        }
        tracing::debug!(root = root_code, codes = codes.len(), "product structure loaded");

        Ok(Self { unifier, catalog, codes })
    }
}

impl Snapshot {
    /// Load everything a cascade rooted at `root_code` can touch and lock
    /// the balance rows of every reached code
    pub async fn for_structure(conn: &mut PgConnection, root_code: &str) -> AppResult<Self> {
        let structure = Structure::load(conn, root_code).await?;
        Self::lock_balances(conn, structure.unifier, structure.catalog, &structure.codes).await
    }

    /// Load and lock the balances of `codes` and their aliases, without structure
    pub async fn for_codes(conn: &mut PgConnection, codes: &[&str]) -> AppResult<Self> {
        let unifier = store::load_unifier(conn).await?;
        let reached: BTreeSet<String> = codes.iter().flat_map(|code| unifier.resolve(code)).collect();
        let codes: Vec<String> = reached.into_iter().collect();

        let mut catalog = Catalog::new();
        for classification in store::fetch_classifications(conn, &codes).await? {
            catalog.add_product(classification);
        }
        Self::lock_balances(conn, unifier, catalog, &codes).await
    }

    async fn lock_balances(
        conn: &mut PgConnection,
        unifier: CodeUnifier,
        catalog: Catalog,
        codes: &[String],
    ) -> AppResult<Self> {
        let mut ledger = StockLedger::new(unifier);
        for balance in store::fetch_balances(conn, codes, true).await? {
            ledger.load_balance(balance);
        }
        Ok(Self { catalog, ledger })
    }

    pub fn unifier(&self) -> &CodeUnifier {
        self.ledger.unifier()
    }

    /// Name stored on a balance row created for `code`
    pub fn display_name(&self, code: &str) -> String {
        self.ledger
            .balance(code)
            .map(|balance| balance.display_name.clone())
            .or_else(|| classification_of(&self.catalog, self.unifier(), code).map(|c| c.display_name))
            .unwrap_or_else(|| code.to_string())
    }

    /// Append `events` and apply their deltas to every unified balance row
    ///
    /// Deltas are summed per code and written in code order, matching the
    /// lock order taken when the snapshot was loaded.
    pub async fn persist(&self, conn: &mut PgConnection, events: &[MovementEvent]) -> AppResult<()> {
        for event in events {
            store::insert_event(conn, event).await?;
        }

        let now = Utc::now();
        for (code, delta) in balance_deltas(self.unifier(), events) {
            store::apply_balance_delta(conn, &code, &self.display_name(&code), delta, now).await?;
        }
        Ok(())
    }
}

/// Net delta per stored code, replicated across unified codes
pub fn balance_deltas(unifier: &CodeUnifier, events: &[MovementEvent]) -> BTreeMap<String, Decimal> {
    let mut deltas: BTreeMap<String, Decimal> = BTreeMap::new();
    for event in events {
        for code in unifier.resolve(&event.product_code) {
            let delta = deltas.entry(code).or_insert(Decimal::ZERO);
            *delta = delta.saturating_add(event.quantity);
        }
    }
    deltas
}
