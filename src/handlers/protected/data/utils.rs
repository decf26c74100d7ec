use crate::error::ApiError;
use crate::records::Collection;

/// Resolve the `:collection` path segment
pub fn parse_collection(name: &str) -> Result<Collection, ApiError> {
    Ok(name.parse::<Collection>()?)
}

/// The settings singleton is never deleted
pub fn ensure_deletable(collection: Collection) -> Result<(), ApiError> {
    if collection == Collection::Settings {
        return Err(ApiError::bad_request("Settings cannot be deleted"));
    }
    Ok(())
}
