//! Gift basket: item quantities picked for another table

use std::collections::BTreeMap;

use super::api::GiftOrderRequest;
use super::events::TableId;
use crate::error::{ChatError, Result};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GiftBasket {
    items: BTreeMap<String, u32>,
}

impl GiftBasket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adjust a quantity, clamping at zero; zero entries are dropped
    pub fn change(&mut self, item_id: &str, delta: i32) -> u32 {
        let current = self.quantity(item_id) as i64;
        let next = (current + delta as i64).clamp(0, u32::MAX as i64) as u32;
        self.set(item_id, next);
        next
    }

    pub fn set(&mut self, item_id: &str, quantity: u32) {
        if quantity == 0 {
            self.items.remove(item_id);
        } else {
            self.items.insert(item_id.to_string(), quantity);
        }
    }

    pub fn quantity(&self, item_id: &str) -> u32 {
        self.items.get(item_id).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &BTreeMap<String, u32> {
        &self.items
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Build the order body; needs a recipient and at least one item
    pub fn to_request(
        &self,
        from_table_id: TableId,
        to_table_id: Option<TableId>,
        message: Option<&str>,
    ) -> Result<GiftOrderRequest> {
        let to_table_id = to_table_id.ok_or(ChatError::IncompleteOrder("no recipient table"))?;
        if self.is_empty() {
            return Err(ChatError::IncompleteOrder("no items selected"));
        }
        let message = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        Ok(GiftOrderRequest {
            from_table_id,
            to_table_id,
            menu: self.items.clone(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_clamps_and_removes() {
        let mut basket = GiftBasket::new();
        assert_eq!(basket.change("beer", 2), 2);
        assert_eq!(basket.change("beer", -5), 0);
        assert!(basket.is_empty());
        assert_eq!(basket.change("soju", -1), 0);
        assert!(basket.is_empty());
    }

    #[test]
    fn test_request_requires_recipient_and_items() {
        let mut basket = GiftBasket::new();
        assert!(matches!(
            basket.to_request(1, Some(2), None),
            Err(ChatError::IncompleteOrder(_))
        ));
        basket.change("pajeon", 1);
        assert!(matches!(
            basket.to_request(1, None, None),
            Err(ChatError::IncompleteOrder(_))
        ));

        let req = basket.to_request(1, Some(2), Some("  enjoy ")).unwrap();
        assert_eq!(req.to_table_id, 2);
        assert_eq!(req.menu.get("pajeon"), Some(&1));
        assert_eq!(req.message.as_deref(), Some("enjoy"));

        let req = basket.to_request(1, Some(2), Some("   ")).unwrap();
        assert_eq!(req.message, None);
    }
}
