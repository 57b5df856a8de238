use crate::error::LedgerError;
use crate::models::Client;
use crate::visibility::TenantView;

/// Returns the id of the client's top-level ancestor.
///
/// A parent that is missing from the view, points at the client itself, or
/// is itself nested is treated as absent: the client becomes its own group.
pub fn top_level_of<'a>(view: &TenantView<'a>, client: &'a Client) -> &'a str {
    let Some(parent_id) = client.parent() else {
        return &client.id;
    };

    match view.client(parent_id) {
        Some(parent) if parent.id != client.id && parent.is_top_level() => &parent.id,
        Some(_) => {
            tracing::warn!(
                client_id = %client.id,
                parent_id,
                "Parent is not a top-level client, grouping client on its own"
            );
            &client.id
        }
        None => {
            tracing::warn!(
                client_id = %client.id,
                parent_id,
                "Dangling parent reference, grouping client on its own"
            );
            &client.id
        }
    }
}

/// Top-level clients as resolved by [`top_level_of`], including clients
/// whose parent reference could not be resolved.
pub fn top_level_clients<'a>(view: &TenantView<'a>) -> Vec<&'a Client> {
    view.clients()
        .iter()
        .copied()
        .filter(|&client| top_level_of(view, client) == client.id)
        .collect()
}

/// Checks that `parent_id` may become the parent of `client_id` (or of a
/// new client when `client_id` is `None`). Keeps the hierarchy two levels deep.
pub fn validate_parent(
    view: &TenantView<'_>,
    client_id: Option<&str>,
    parent_id: &str,
) -> Result<(), LedgerError> {
    let parent_id = parent_id.trim();
    if parent_id.is_empty() {
        return Ok(());
    }

    if client_id == Some(parent_id) {
        return Err(LedgerError::validation("A client cannot be its own parent."));
    }

    let parent = view
        .client(parent_id)
        .ok_or_else(|| LedgerError::not_found("client", parent_id))?;

    if !parent.is_top_level() {
        return Err(LedgerError::validation(format!(
            "Client {} is a sub-client and cannot have sub-clients.",
            parent.name
        )));
    }

    if let Some(client_id) = client_id {
        if !view.children_of(client_id).is_empty() {
            return Err(LedgerError::validation(
                "A client with sub-clients cannot become a sub-client.",
            ));
        }
    }

    Ok(())
}
