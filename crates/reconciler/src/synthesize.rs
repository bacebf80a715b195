//! Desired shapes of the dependents of a declaration.
//!
//! Pure functions: the same declaration always produces the same shapes.

use webapp_core::{
    Container, ContainerPort, Exposure, ExposureSpec, ExposureType, Labels, ObjectMeta,
    PodTemplate, Protocol, Result, Scheme, ServicePort, WebApp, Workload, WorkloadSpec,
    WorkloadStatus,
};

use crate::ownership::set_controller_reference;

/// Value of the `managed-by` label on every dependent.
pub const MANAGED_BY: &str = "webapp-operator";

/// Port the exposure listens on.
pub const EXPOSURE_PORT: i32 = 80;

/// Name of the single container and exposure port.
pub const PORT_NAME: &str = "http";

/// Labels selecting the pods of one declaration.
#[must_use]
pub fn labels_for(name: &str) -> Labels {
    Labels::from([
        ("app".to_string(), name.to_string()),
        ("managed-by".to_string(), MANAGED_BY.to_string()),
    ])
}

fn dependent_meta(webapp: &WebApp, scheme: &Scheme) -> Result<ObjectMeta> {
    let mut meta = ObjectMeta::new(webapp.metadata.namespace.clone(), webapp.metadata.name.clone())
        .with_labels(labels_for(&webapp.metadata.name));
    set_controller_reference(webapp, &mut meta, scheme)?;
    Ok(meta)
}

/// The workload a declaration should have.
///
/// # Errors
///
/// Returns `Error::UnregisteredKind` if the scheme does not know the
/// declaration kind, so no owner reference can be built.
pub fn workload_for(webapp: &WebApp, scheme: &Scheme) -> Result<Workload> {
    let labels = labels_for(&webapp.metadata.name);
    Ok(Workload {
        metadata: dependent_meta(webapp, scheme)?,
        spec: WorkloadSpec {
            replicas: webapp.spec.replicas,
            selector: labels.clone(),
            template: PodTemplate {
                labels,
                container: Container {
                    name: webapp.metadata.name.clone(),
                    image: webapp.spec.image.clone(),
                    ports: vec![ContainerPort {
                        name: PORT_NAME.to_string(),
                        container_port: webapp.spec.effective_port(),
                    }],
                    env: webapp.spec.env.clone(),
                },
            },
        },
        status: WorkloadStatus::default(),
    })
}

/// The exposure a declaration should have.
///
/// # Errors
///
/// Same as [`workload_for`].
pub fn exposure_for(webapp: &WebApp, scheme: &Scheme) -> Result<Exposure> {
    Ok(Exposure {
        metadata: dependent_meta(webapp, scheme)?,
        spec: ExposureSpec {
            selector: labels_for(&webapp.metadata.name),
            ports: vec![ServicePort {
                name: PORT_NAME.to_string(),
                port: EXPOSURE_PORT,
                target_port: webapp.spec.effective_port(),
                protocol: Protocol::Tcp,
            }],
            exposure_type: ExposureType::ClusterIP,
        },
    })
}
