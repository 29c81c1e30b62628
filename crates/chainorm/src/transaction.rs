//! Transaction helper.
//!
//! Builders never open transactions on their own; wrap the work in [`transaction!`] and
//! pass the same connection to every terminal inside the block.
//!
//! ```ignore
//! let moved = chainorm::transaction!(&conn, {
//!     db.table("accounts").where_("id", 1).decrement(&conn, "balance", 100).await?;
//!     db.table("accounts").where_("id", 2).increment(&conn, "balance", 100).await?;
//!     Ok(2)
//! })?;
//! ```

use crate::error::OrmError;

/// Runs `$body` between `begin` and `commit` on `$conn`.
///
/// - Commits when the block evaluates to `Ok(_)`.
/// - Rolls back on `Err(_)` and returns the block's error.
/// - Calls `release` on the connection afterwards in every case.
///
/// The block must evaluate to `chainorm::OrmResult<T>`.
#[macro_export]
macro_rules! transaction {
    ($conn:expr, $body:block) => {{
        let __chainorm_conn = $conn;
        let __chainorm_result: $crate::OrmResult<_> =
            match $crate::Connection::begin(&__chainorm_conn).await {
                Ok(()) => {
                    let __chainorm_body: $crate::OrmResult<_> = async { $body }.await;
                    match __chainorm_body {
                        Ok(value) => $crate::Connection::commit(&__chainorm_conn)
                            .await
                            .map(|()| value),
                        Err(error) => match $crate::Connection::rollback(&__chainorm_conn).await {
                            Ok(()) => Err(error),
                            Err(rollback) => {
                                Err($crate::transaction::__rollback_failed(error, rollback))
                            }
                        },
                    }
                }
                Err(error) => Err(error),
            };
        match $crate::Connection::release(&__chainorm_conn).await {
            Ok(()) => __chainorm_result,
            Err(release) => __chainorm_result.and(Err(release)),
        }
    }};
}

#[doc(hidden)]
pub fn __rollback_failed(error: OrmError, rollback: OrmError) -> OrmError {
    OrmError::execution(format!("{error} (rollback failed: {rollback})"))
}
