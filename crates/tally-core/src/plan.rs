//! The credit-pack catalog.
//!
//! Plans are fixed-size credit packs. The catalog is an injected read-only
//! lookup owned by the service configuration, never process-global state.

use serde::{Deserialize, Serialize};

/// One purchasable credit pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Catalog identifier (e.g. "starter").
    pub id: String,

    /// Display name.
    pub name: String,

    /// Display description.
    pub description: String,

    /// Credits granted on purchase.
    pub credits: i64,

    /// Price in cents.
    pub amount_cents: i64,

    /// Price currency (lowercase ISO code).
    pub currency: String,

    /// Marketing highlight flag.
    #[serde(default)]
    pub popular: bool,
}

/// Read-only plan lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    /// Build a catalog from explicit plans.
    #[must_use]
    pub fn new(plans: Vec<Plan>) -> Self {
        Self { plans }
    }

    /// Look up a plan by catalog ID.
    #[must_use]
    pub fn get(&self, plan_id: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id == plan_id)
    }

    /// All plans, in catalog order.
    #[must_use]
    pub fn all(&self) -> &[Plan] {
        &self.plans
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self {
            plans: vec![
                Plan {
                    id: "starter".into(),
                    name: "Starter Pack".into(),
                    description: "500 credits for casual users".into(),
                    credits: 500,
                    amount_cents: 499,
                    currency: "usd".into(),
                    popular: false,
                },
                Plan {
                    id: "pro".into(),
                    name: "Pro Pack".into(),
                    description: "2000 credits - Best value!".into(),
                    credits: 2000,
                    amount_cents: 1499,
                    currency: "usd".into(),
                    popular: true,
                },
                Plan {
                    id: "ultimate".into(),
                    name: "Ultimate Pack".into(),
                    description: "5000 credits for power users".into(),
                    credits: 5000,
                    amount_cents: 2999,
                    currency: "usd".into(),
                    popular: false,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_has_three_packs() {
        let catalog = PlanCatalog::default();
        assert_eq!(catalog.all().len(), 3);

        let pro = catalog.get("pro").unwrap();
        assert_eq!(pro.credits, 2000);
        assert_eq!(pro.amount_cents, 1499);
        assert!(pro.popular);
    }

    #[test]
    fn unknown_plan_is_none() {
        let catalog = PlanCatalog::default();
        assert!(catalog.get("mega").is_none());
    }
}
