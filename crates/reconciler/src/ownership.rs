//! Owner references linking dependents to their declaration.
//!
//! The store deletes dependents when their controller owner goes away, so
//! the reconciler never tracks them itself. The same references let the
//! secondary watches map a dependent event back to the owning declaration.

use webapp_core::{Error, Gvk, Kind, ObjectKey, ObjectMeta, OwnerReference, Result, Scheme, WebApp};

/// Record `owner` as the controller of `child`.
///
/// An existing controller reference to the same owner is refreshed in place;
/// references to non-controller owners are left untouched.
///
/// # Errors
///
/// Returns `Error::OwnershipConflict` if `child` is already controlled by a
/// different object, and `Error::UnregisteredKind` if the scheme does not
/// know the declaration kind.
pub fn set_controller_reference(owner: &WebApp, child: &mut ObjectMeta, scheme: &Scheme) -> Result<()> {
    let gvk = scheme.gvk(Kind::WebApp)?;
    let reference = OwnerReference {
        api_version: gvk.api_version(),
        kind: gvk.kind.clone(),
        name: owner.metadata.name.clone(),
        uid: owner.metadata.uid.clone(),
        controller: true,
        block_owner_deletion: true,
    };

    if let Some(existing) = controller_of(child) {
        if existing.uid != reference.uid {
            return Err(Error::ownership_conflict(
                &child.key(),
                format!("{}/{}", existing.kind, existing.name),
            ));
        }
    }

    child.owner_references.retain(|r| r.uid != reference.uid);
    child.owner_references.push(reference);
    Ok(())
}

/// The controller owner reference of an object, if it has one.
#[must_use]
pub fn controller_of(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.controller_reference()
}

/// Whether `meta` is controlled by `owner`.
#[must_use]
pub fn is_controlled_by(meta: &ObjectMeta, owner: &WebApp) -> bool {
    controller_of(meta).is_some_and(|r| r.uid == owner.metadata.uid)
}

/// Identity of the declaration controlling a dependent.
///
/// Owners are namespace-scoped, so the owner lives in the dependent's
/// namespace. Returns `None` when the dependent has no controller reference
/// of the given kind.
#[must_use]
pub fn owner_key_for(meta: &ObjectMeta, owner_gvk: &Gvk) -> Option<ObjectKey> {
    controller_of(meta)
        .filter(|r| r.kind == owner_gvk.kind && r.api_version == owner_gvk.api_version())
        .map(|r| ObjectKey::new(meta.namespace.clone(), r.name.clone()))
}
