use std::sync::Arc;

use depotflow_core::{CompanyId, ItemId};

/// Item master lookup of the *current* selling price (minor units).
///
/// Receiving stamps this on new inventory records; it is deliberately
/// independent of the price frozen on the purchase order.
pub trait SellingPriceLookup: Send + Sync {
    fn selling_price(&self, company_id: CompanyId, item_id: ItemId) -> Option<i64>;
}

impl<P> SellingPriceLookup for Arc<P>
where
    P: SellingPriceLookup + ?Sized,
{
    fn selling_price(&self, company_id: CompanyId, item_id: ItemId) -> Option<i64> {
        (**self).selling_price(company_id, item_id)
    }
}
