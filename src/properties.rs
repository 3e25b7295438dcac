//! Dead-property and ETag helpers.

use crate::error::{Error, Result};
use crate::store::{DeadProperty, EntityTag, Entry};

/// The ETag a client would observe on `entry`.
///
/// Native ETags win. On a backend without them the `DAV:getetag` dead
/// property is used, which is how an ETag survives a copy between backends.
pub async fn get_etag(entry: &Entry) -> Result<Option<EntityTag>> {
    let fs = entry.file_system();
    if fs.supports_etag() {
        if let Entry::Document(document) = entry {
            return document.etag().await;
        }
        return Ok(None);
    }
    let Some(store) = fs.property_store() else {
        return Ok(None);
    };
    Ok(store
        .get(entry.path())
        .await?
        .into_iter()
        .find(|p| p.name.is_getetag())
        .map(|p| EntityTag::parse(&p.value)))
}

/// Dead properties of `entry`, excluding `DAV:getetag`.
pub async fn dead_properties(entry: &Entry) -> Result<Vec<DeadProperty>> {
    let Some(store) = entry.file_system().property_store() else {
        return Ok(Vec::new());
    };
    let mut props = store.get(entry.path()).await?;
    props.retain(|p| !p.name.is_getetag());
    Ok(props)
}

/// Store one dead property on `entry`.
///
/// Fails with [`Error::NotSupported`] when the backend has no property store.
pub async fn set_property(entry: &Entry, property: DeadProperty) -> Result<()> {
    let store = entry
        .file_system()
        .property_store()
        .ok_or(Error::NotSupported("dead properties"))?;
    store.set(entry.path(), property).await
}
