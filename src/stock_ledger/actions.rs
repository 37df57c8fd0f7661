/// Custom actions for stock items beyond CRUD.
#[derive(Debug, Clone)]
pub enum StockAction {
    /// Compare-and-swap decrement.
    ///
    /// Applies only when the stored version equals `expected_version` and the
    /// stored quantity covers `amount`. On success quantity drops by `amount`
    /// and the version moves up by one.
    Decrement { amount: u32, expected_version: u64 },
    /// Additive increment, used to hand back a reservation that could not be queued.
    Restock { amount: u32 },
}
