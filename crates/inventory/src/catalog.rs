//! Product and warehouse registry.
//!
//! Identity (`id`, `sku`, `code`) is immutable; product metadata can be
//! patched. The engine validates every movement against this registry
//! before anything reaches the ledger.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use stockbook_core::{InventoryError, InventoryResult, ProductId, WarehouseId};

/// A stocked product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    /// Unit of measure (e.g. "pcs", "kg").
    pub unit: String,
    /// Total on-hand below this across all warehouses flags the product as
    /// low stock. Zero disables the check.
    pub reorder_threshold: i64,
    pub description: Option<String>,
}

impl Product {
    pub fn new(sku: impl Into<String>, name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            id: ProductId::new(),
            sku: sku.into(),
            name: name.into(),
            unit: unit.into(),
            reorder_threshold: 0,
            description: None,
        }
    }

    pub fn with_reorder_threshold(mut self, threshold: i64) -> Self {
        self.reorder_threshold = threshold;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Mutable product metadata; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub unit: Option<String>,
    pub reorder_threshold: Option<i64>,
    pub description: Option<String>,
}

/// A storage location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub code: String,
    pub name: String,
    pub location: Option<String>,
    /// Advisory; the engine does not enforce it.
    pub capacity: Option<i64>,
}

impl Warehouse {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: WarehouseId::new(),
            code: code.into(),
            name: name.into(),
            location: None,
            capacity: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_capacity(mut self, capacity: i64) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

#[derive(Debug, Default)]
struct CatalogInner {
    products: HashMap<ProductId, Product>,
    sku_index: HashMap<String, ProductId>,
    warehouses: HashMap<WarehouseId, Warehouse>,
    code_index: HashMap<String, WarehouseId>,
}

/// In-memory registry of products and warehouses.
#[derive(Debug, Default)]
pub struct Catalog {
    inner: RwLock<CatalogInner>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a product; SKUs are unique.
    pub fn add_product(&self, product: Product) -> InventoryResult<ProductId> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.sku_index.contains_key(&product.sku) {
            return Err(InventoryError::DuplicateProduct { sku: product.sku });
        }
        let id = product.id;
        inner.sku_index.insert(product.sku.clone(), id);
        inner.products.insert(id, product);
        Ok(id)
    }

    pub fn product(&self, id: ProductId) -> Option<Product> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.products.get(&id).cloned()
    }

    pub fn has_product(&self, id: ProductId) -> bool {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.products.contains_key(&id)
    }

    /// All products, SKU order.
    pub fn list_products(&self) -> Vec<Product> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut products: Vec<_> = inner.products.values().cloned().collect();
        products.sort_by(|a, b| a.sku.cmp(&b.sku));
        products
    }

    /// Patch mutable product metadata. Identity (`id`, `sku`) is fixed.
    pub fn update_product(&self, id: ProductId, patch: ProductPatch) -> InventoryResult<Product> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let product = inner
            .products
            .get_mut(&id)
            .ok_or(InventoryError::UnknownProduct { product: id })?;

        if let Some(name) = patch.name {
            product.name = name;
        }
        if let Some(unit) = patch.unit {
            product.unit = unit;
        }
        if let Some(threshold) = patch.reorder_threshold {
            product.reorder_threshold = threshold;
        }
        if let Some(description) = patch.description {
            product.description = Some(description);
        }
        Ok(product.clone())
    }

    /// Register a warehouse; codes are unique.
    pub fn add_warehouse(&self, warehouse: Warehouse) -> InventoryResult<WarehouseId> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.code_index.contains_key(&warehouse.code) {
            return Err(InventoryError::DuplicateWarehouse {
                code: warehouse.code,
            });
        }
        let id = warehouse.id;
        inner.code_index.insert(warehouse.code.clone(), id);
        inner.warehouses.insert(id, warehouse);
        Ok(id)
    }

    pub fn warehouse(&self, id: WarehouseId) -> Option<Warehouse> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.warehouses.get(&id).cloned()
    }

    pub fn has_warehouse(&self, id: WarehouseId) -> bool {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.warehouses.contains_key(&id)
    }

    /// All warehouses, code order.
    pub fn list_warehouses(&self) -> Vec<Warehouse> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut warehouses: Vec<_> = inner.warehouses.values().cloned().collect();
        warehouses.sort_by(|a, b| a.code.cmp(&b.code));
        warehouses
    }

    pub fn product_count(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.products.len()
    }

    pub fn warehouse_count(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.warehouses.len()
    }
}
