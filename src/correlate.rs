//! Ticket correlation: at most one open external ticket per fault signature.
//!
//! A flapping condition (fire → resolve → fire) produces a stream of alert
//! records that all share one signature. Before the dispatch layer opens an
//! external ticket for a new occurrence, it asks here whether an earlier
//! occurrence already carries a ticket that is still being worked. This is a
//! read-time computation over the store — no separately maintained index —
//! so it is always consistent with the store's mutations at the cost of one
//! filtered scan, which is fine on the low-frequency ticket-creation path.

use crate::error::PersistenceError;
use crate::model::TicketLink;
use crate::store::AlertStore;

/// Find the most recent still-open ticket for a signature.
///
/// Scans the signature's ticket-carrying alerts newest-first and returns the
/// first whose alert has not reached `resolved`; `None` when every linked
/// occurrence is resolved or none was ever linked. A `Some` result means the
/// caller should attach new occurrences to the returned ticket instead of
/// opening another one.
pub async fn find_open_ticket(
    store: &AlertStore,
    signature: &str,
) -> Result<Option<TicketLink>, PersistenceError> {
    let linked = store.linked_alerts_for_signature(signature).await?;

    for alert in linked {
        if alert.status == crate::model::AlertStatus::Resolved {
            continue;
        }
        if let Some(ticket) = alert.ticket {
            return Ok(Some(TicketLink {
                ticket_key: ticket.ticket_key,
                ticket_url: ticket.ticket_url,
                linked_at: ticket.linked_at,
                alert_id: alert.alert_id,
                alert_status: alert.status,
            }));
        }
    }

    Ok(None)
}
