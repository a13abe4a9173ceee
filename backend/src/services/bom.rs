//! Product structure service: component links, explosion and requirements

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{BomNode, ComponentLink, LinkAuditEntry, ProductClassification};
use crate::services::ledger::load_projection_ledger;
use crate::services::snapshot::Structure;
use crate::services::store;
use shared::bom::{BomExplosion, Catalog};
use shared::requirement::{horizon_to, material_requirements, ComponentRequirement};
use shared::validation::{validate_horizon, validate_product_code, validate_quantity};

/// BOM service
#[derive(Clone)]
pub struct BomService {
    db: PgPool,
    max_depth: u32,
}

/// Input for creating a component link
#[derive(Debug, Deserialize)]
pub struct CreateLinkInput {
    pub parent_product_code: String,
    pub component_product_code: String,
    pub quantity_per_unit: Decimal,
    pub version_tag: Option<String>,
    pub actor: Option<String>,
}

/// Input for changing the quantity of a link
#[derive(Debug, Deserialize)]
pub struct RequantifyLinkInput {
    pub quantity_per_unit: Decimal,
    pub actor: Option<String>,
}

/// Input for deactivating a link
#[derive(Debug, Default, Deserialize)]
pub struct DeactivateLinkInput {
    pub actor: Option<String>,
}

/// Input for registering a classification
#[derive(Debug, Deserialize)]
pub struct ClassificationInput {
    pub product_code: String,
    pub display_name: String,
    #[serde(default)]
    pub is_manufactured: bool,
    #[serde(default)]
    pub is_purchased: bool,
    #[serde(default)]
    pub is_sellable: bool,
}

/// Input for assigning a product to a unification group
#[derive(Debug, Deserialize)]
pub struct UnificationInput {
    pub product_code: String,
    pub unification_code: String,
}

/// Material requirements of one production, netted against projected stock
#[derive(Debug, Clone, Serialize)]
pub struct RequirementsReport {
    pub product_code: String,
    pub quantity: Decimal,
    pub as_of_date: NaiveDate,
    pub lines: Vec<ComponentRequirement>,
    pub tree: BomNode,
}

pub const DEFAULT_VERSION_TAG: &str = "v1";

impl BomService {
    /// Create a new BomService instance
    pub fn new(db: PgPool, max_depth: u32) -> Self {
        Self { db, max_depth }
    }

    /// Register a new active link
    pub async fn create_link(&self, input: CreateLinkInput) -> AppResult<ComponentLink> {
        let version_tag = input.version_tag.unwrap_or_else(|| DEFAULT_VERSION_TAG.to_string());
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        let existing = store::fetch_active_links(&mut tx, std::slice::from_ref(&input.parent_product_code)).await?;
        let mut catalog = Catalog::new();
        for link in existing {
            catalog.insert_link(link);
        }

        let id = catalog.add_link(
            &input.parent_product_code,
            &input.component_product_code,
            input.quantity_per_unit,
            &version_tag,
            input.actor,
            now,
        )?;
        let link = catalog
            .link(id)
            .cloned()
            .ok_or_else(|| AppError::Internal("Created link missing from catalog".to_string()))?;

        store::insert_link(&mut tx, &link).await?;
        for entry in catalog.audit_log() {
            store::insert_audit(&mut tx, entry).await?;
        }
        tx.commit().await?;

        tracing::info!(
            link_id = %link.id,
            parent = %link.parent_product_code,
            component = %link.component_product_code,
            "component link created"
        );
        Ok(link)
    }

    /// Change the quantity of a link; the old row is kept as inactive
    pub async fn requantify_link(&self, link_id: Uuid, input: RequantifyLinkInput) -> AppResult<ComponentLink> {
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        let mut catalog = Catalog::new();
        catalog.insert_link(store::fetch_link(&mut tx, link_id, true).await?);

        let new_id = catalog.requantify_link(link_id, input.quantity_per_unit, input.actor, now)?;
        let old = catalog
            .link(link_id)
            .ok_or_else(|| AppError::Internal("Requantified link missing from catalog".to_string()))?;
        let replacement = catalog
            .link(new_id)
            .cloned()
            .ok_or_else(|| AppError::Internal("Replacement link missing from catalog".to_string()))?;

        // one active row per edge; superseded_by must point at a stored row
        let mut retired = old.clone();
        retired.superseded_by = None;
        store::update_link_status(&mut tx, &retired).await?;
        store::insert_link(&mut tx, &replacement).await?;
        store::update_link_status(&mut tx, old).await?;
        for entry in catalog.audit_log() {
            store::insert_audit(&mut tx, entry).await?;
        }
        tx.commit().await?;

        tracing::info!(old = %link_id, new = %new_id, "component link requantified");
        Ok(replacement)
    }

    /// Soft-delete a link
    pub async fn deactivate_link(&self, link_id: Uuid, input: DeactivateLinkInput) -> AppResult<ComponentLink> {
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        let mut catalog = Catalog::new();
        catalog.insert_link(store::fetch_link(&mut tx, link_id, true).await?);
        catalog.deactivate_link(link_id, input.actor, now)?;

        let link = catalog
            .link(link_id)
            .cloned()
            .ok_or_else(|| AppError::Internal("Deactivated link missing from catalog".to_string()))?;
        store::update_link_status(&mut tx, &link).await?;
        for entry in catalog.audit_log() {
            store::insert_audit(&mut tx, entry).await?;
        }
        tx.commit().await?;

        tracing::info!(link_id = %link_id, "component link deactivated");
        Ok(link)
    }

    /// Active links of a parent
    pub async fn list_links(&self, parent_code: &str) -> AppResult<Vec<ComponentLink>> {
        let mut conn = self.db.acquire().await?;
        store::fetch_active_links(&mut conn, &[parent_code.to_string()]).await
    }

    pub async fn get_link(&self, link_id: Uuid) -> AppResult<ComponentLink> {
        let mut conn = self.db.acquire().await?;
        store::fetch_link(&mut conn, link_id, false).await
    }

    /// Audit trail of a link, oldest first
    pub async fn link_audit(&self, link_id: Uuid) -> AppResult<Vec<LinkAuditEntry>> {
        let rows = sqlx::query_as::<_, store::AuditRow>(
            r#"
            SELECT id, link_id, action, quantity_per_unit, actor, recorded_at
            FROM component_link_audit
            WHERE link_id = $1
            ORDER BY recorded_at, id
            "#,
        )
        .bind(link_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(LinkAuditEntry::try_from).collect()
    }

    /// Explode the structure of a product for a quantity
    pub async fn explode(&self, product_code: &str, quantity: Decimal) -> AppResult<BomNode> {
        validate_product_code(product_code).map_err(|m| AppError::invalid("product_code", m))?;
        validate_quantity(quantity).map_err(|m| AppError::invalid("quantity", m))?;

        let mut conn = self.db.acquire().await?;
        let structure = Structure::load(&mut conn, product_code).await?;

        let tree = BomExplosion::new(&structure.catalog, &structure.unifier, self.max_depth).explode(product_code, quantity);
        for (code, error) in tree.errors() {
            tracing::warn!(root = product_code, product_code = code, error = error.code(), "explosion branch error");
        }
        Ok(tree)
    }

    /// Component requirements of a production netted against projected stock
    pub async fn requirements(
        &self,
        product_code: &str,
        quantity: Decimal,
        as_of_date: Option<NaiveDate>,
    ) -> AppResult<RequirementsReport> {
        let tree = self.explode(product_code, quantity).await?;
        let today = Utc::now().date_naive();
        let as_of_date = as_of_date.unwrap_or(today);
        let horizon = horizon_to(today, as_of_date);
        validate_horizon(horizon).map_err(|m| AppError::invalid("as_of_date", m))?;

        let mut conn = self.db.acquire().await?;
        let mut projections = HashMap::new();
        for node in tree.flatten().into_iter().skip(1) {
            if projections.contains_key(&node.product_code) {
                continue;
            }
            let ledger = load_projection_ledger(&mut conn, &node.product_code, today, horizon, false).await?;
            projections.insert(node.product_code.clone(), ledger.projection(&node.product_code, today, horizon));
        }

        Ok(RequirementsReport {
            product_code: product_code.to_string(),
            quantity,
            as_of_date,
            lines: material_requirements(&tree, &projections, as_of_date),
            tree,
        })
    }

    /// Register or replace the classification of a product
    pub async fn upsert_classification(&self, input: ClassificationInput) -> AppResult<ProductClassification> {
        validate_product_code(&input.product_code).map_err(|m| AppError::invalid("product_code", m))?;
        if input.display_name.trim().is_empty() {
            return Err(AppError::Validation {
                field: "display_name".to_string(),
                message: "Display name is required".to_string(),
                message_pt: "O nome do produto é obrigatório".to_string(),
            });
        }

        let row = sqlx::query_as::<_, store::ClassificationRow>(
            r#"
            INSERT INTO product_classifications (product_code, display_name, is_manufactured, is_purchased, is_sellable)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (product_code) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                is_manufactured = EXCLUDED.is_manufactured,
                is_purchased = EXCLUDED.is_purchased,
                is_sellable = EXCLUDED.is_sellable,
                updated_at = NOW()
            RETURNING product_code, display_name, is_manufactured, is_purchased, is_sellable
            "#,
        )
        .bind(&input.product_code)
        .bind(&input.display_name)
        .bind(input.is_manufactured)
        .bind(input.is_purchased)
        .bind(input.is_sellable)
        .fetch_one(&self.db)
        .await?;

        Ok(row.into())
    }

    pub async fn get_classification(&self, product_code: &str) -> AppResult<ProductClassification> {
        let mut conn = self.db.acquire().await?;
        store::fetch_classifications(&mut conn, &[product_code.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("Product {}", product_code)))
    }

    /// Put a product in a unification group; returns the group's codes
    pub async fn assign_unification(&self, input: UnificationInput) -> AppResult<Vec<String>> {
        validate_product_code(&input.product_code).map_err(|m| AppError::invalid("product_code", m))?;
        validate_product_code(&input.unification_code).map_err(|m| AppError::invalid("unification_code", m))?;

        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO product_unifications (product_code, unification_code)
            VALUES ($1, $2)
            ON CONFLICT (product_code) DO UPDATE SET unification_code = EXCLUDED.unification_code
            "#,
        )
        .bind(&input.product_code)
        .bind(&input.unification_code)
        .execute(&mut *tx)
        .await?;

        let unifier = store::load_unifier(&mut tx).await?;
        let codes: Vec<String> = unifier.resolve(&input.product_code).into_iter().collect();
        // merged rows read differently now
        store::mark_projection_stale(&mut tx, &codes).await?;
        tx.commit().await?;

        Ok(codes)
    }
}
