//! Expands a template pod into a batch of uniquely named requests.

use schedbench_core::Pod;

/// One pod to create. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    namespace: String,
    name: String,
    pod: Pod,
}

impl CreateRequest {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The body sent to the control plane.
    pub fn pod(&self) -> &Pod {
        &self.pod
    }
}

/// Every request for one run, named `base-0` .. `base-{count-1}`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkBatch {
    base: String,
    requests: Vec<CreateRequest>,
}

impl WorkBatch {
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn requests(&self) -> &[CreateRequest] {
        &self.requests
    }

    pub fn into_requests(self) -> Vec<CreateRequest> {
        self.requests
    }
}

/// The template name with trailing `-` separators stripped.
fn base_name(template_name: &str) -> &str {
    template_name.trim_end_matches('-')
}

fn request_name(base: &str, index: usize) -> String {
    format!("{base}-{index}")
}

/// Split a generated name back into its base and index.
///
/// Only canonical indices are accepted, so `probe-01` does not parse.
pub fn parse_request_name(name: &str) -> Option<(&str, usize)> {
    let (base, digits) = name.rsplit_once('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    let index = digits.parse().ok()?;
    Some((base, index))
}

/// Build `count` requests from `template`.
///
/// Server-populated metadata and status are cleared on each copy so a pod
/// exported from a live cluster can be replayed.
pub fn build_batch(template: &Pod, count: usize) -> WorkBatch {
    let base = base_name(template.name()).to_string();
    let namespace = template.namespace().to_string();

    let requests = (0..count)
        .map(|i| {
            let name = request_name(&base, i);
            let mut pod = template.clone();
            pod.metadata.name = name.clone();
            pod.metadata.namespace = Some(namespace.clone());
            pod.metadata.resource_version = None;
            pod.metadata.uid = None;
            pod.metadata.creation_timestamp = None;
            pod.status = None;
            CreateRequest {
                namespace: namespace.clone(),
                name,
                pod,
            }
        })
        .collect();

    WorkBatch { base, requests }
}
