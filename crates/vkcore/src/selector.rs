//! Physical device selection.
//!
//! Candidates are checked in platform order: capabilities, then extensions,
//! then a queue family able to run graphics or compute work. The first
//! candidate passing all three wins; there is no scoring.

use ash::vk;

use crate::capability::{all_required_supported, missing_required, Capability};
use crate::driver::InstanceApi;
use crate::error::{Result, VkCoreError};

/// Queue operations a family must offer (at least one of).
pub const WORK_QUEUE_FLAGS: vk::QueueFlags = vk::QueueFlags::from_raw(
    vk::QueueFlags::GRAPHICS.as_raw() | vk::QueueFlags::COMPUTE.as_raw(),
);

/// What a physical device advertises, gathered once per selection pass.
#[derive(Debug, Clone)]
pub struct AcceleratorCandidate {
    pub handle: vk::PhysicalDevice,
    pub features: vk::PhysicalDeviceFeatures,
    pub extensions: Vec<String>,
    pub queue_families: Vec<vk::QueueFlags>,
}

impl AcceleratorCandidate {
    pub fn gather(instance: &dyn InstanceApi, handle: vk::PhysicalDevice) -> Self {
        let extensions = instance.device_extensions(handle).unwrap_or_else(|err| {
            log::debug!("extension query failed for {handle:?} ({err}); treating as none");
            Vec::new()
        });

        Self {
            handle,
            features: instance.features(handle),
            extensions,
            queue_families: instance
                .queue_families(handle)
                .iter()
                .map(|family| family.queue_flags)
                .collect(),
        }
    }

    /// Index of the first family supporting graphics or compute.
    pub fn queue_family_index(&self) -> Option<u32> {
        self.queue_families
            .iter()
            .position(|flags| flags.intersects(WORK_QUEUE_FLAGS))
            .map(|idx| idx as u32)
    }

    /// The work queue family when this candidate meets every requirement.
    pub fn evaluate(&self, capabilities: &[Capability], extensions: &[String]) -> Option<u32> {
        if !all_required_supported(&self.features, capabilities) {
            log::debug!("{:?}: missing required capabilities", self.handle);
            return None;
        }
        if !all_required_supported(&self.extensions, extensions) {
            log::debug!("{:?}: missing required extensions", self.handle);
            return None;
        }
        let family = self.queue_family_index();
        if family.is_none() {
            log::debug!("{:?}: no graphics or compute queue family", self.handle);
        }
        family
    }
}

/// Winning candidate and its work queue family.
#[derive(Debug, Clone)]
pub struct Selection {
    pub candidate: AcceleratorCandidate,
    pub queue_family_index: u32,
}

pub fn select_candidate<I>(candidates: I, capabilities: &[Capability], extensions: &[String]) -> Result<Selection>
where
    I: IntoIterator<Item = AcceleratorCandidate>,
{
    candidates
        .into_iter()
        .find_map(|candidate| {
            let queue_family_index = candidate.evaluate(capabilities, extensions)?;
            Some(Selection {
                candidate,
                queue_family_index,
            })
        })
        .ok_or(VkCoreError::NoSuitableDevice)
}

/// Pick the first physical device of `instance` meeting the requirements.
///
/// Candidates after the winner are never queried.
pub fn choose_physical_device(
    instance: &dyn InstanceApi,
    capabilities: &[Capability],
    extensions: &[String],
) -> Result<Selection> {
    let devices = instance
        .enumerate_physical_devices()
        .map_err(|result| VkCoreError::EnumerationFailed {
            call: "vkEnumeratePhysicalDevices",
            result,
        })?;
    log::debug!("{} physical device(s) enumerated", devices.len());

    let selection = select_candidate(
        devices
            .into_iter()
            .map(|handle| AcceleratorCandidate::gather(instance, handle)),
        capabilities,
        extensions,
    )?;
    log::info!(
        "selected physical device {:?} (queue family {})",
        selection.candidate.handle,
        selection.queue_family_index
    );
    Ok(selection)
}

/// Check host-supplied advertised sets directly, reporting what is missing.
pub fn check_adopted(
    features: &vk::PhysicalDeviceFeatures,
    available_extensions: &[String],
    capabilities: &[Capability],
    extensions: &[String],
) -> Result<()> {
    let missing = missing_required(features, capabilities);
    if !missing.is_empty() {
        return Err(VkCoreError::UnsupportedCapability { missing });
    }

    let missing = missing_required(available_extensions, extensions);
    if !missing.is_empty() {
        return Err(VkCoreError::UnsupportedExtension { missing });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::requested_features;
    use ash::vk::Handle;

    fn candidate(raw: u64, caps: &[Capability], exts: &[&str], families: &[vk::QueueFlags]) -> AcceleratorCandidate {
        AcceleratorCandidate {
            handle: vk::PhysicalDevice::from_raw(raw),
            features: requested_features(caps),
            extensions: exts.iter().map(|e| e.to_string()).collect(),
            queue_families: families.to_vec(),
        }
    }

    fn exts(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn returns_the_only_matching_candidate() {
        let graphics = [vk::QueueFlags::GRAPHICS];
        let candidates = vec![
            candidate(1, &[], &["VK_KHR_16bit_storage"], &graphics),
            candidate(2, &[Capability::ShaderInt64], &[], &graphics),
            candidate(3, &[Capability::ShaderInt64], &["VK_KHR_16bit_storage"], &graphics),
            candidate(4, &[Capability::ShaderInt64], &["VK_KHR_16bit_storage"], &[vk::QueueFlags::TRANSFER]),
        ];

        let selection = select_candidate(
            candidates,
            &[Capability::ShaderInt64],
            &exts(&["VK_KHR_16bit_storage"]),
        )
        .unwrap();
        assert_eq!(selection.candidate.handle.as_raw(), 3);
        assert_eq!(selection.queue_family_index, 0);
    }

    #[test]
    fn lower_index_wins_on_ties() {
        let compute = [vk::QueueFlags::COMPUTE];
        let candidates = vec![
            candidate(7, &[Capability::WideLines], &[], &compute),
            candidate(8, &[Capability::WideLines], &[], &compute),
        ];
        let selection = select_candidate(candidates, &[Capability::WideLines], &[]).unwrap();
        assert_eq!(selection.candidate.handle.as_raw(), 7);
    }

    #[test]
    fn first_work_family_is_chosen() {
        let c = candidate(
            1,
            &[],
            &[],
            &[vk::QueueFlags::TRANSFER, vk::QueueFlags::COMPUTE, vk::QueueFlags::GRAPHICS],
        );
        assert_eq!(c.queue_family_index(), Some(1));
        assert_eq!(candidate(2, &[], &[], &[vk::QueueFlags::SPARSE_BINDING]).queue_family_index(), None);
    }

    #[test]
    fn missing_capability_everywhere_means_no_device() {
        let candidates = vec![
            candidate(1, &[], &["VK_KHR_16bit_storage"], &[vk::QueueFlags::GRAPHICS]),
            candidate(2, &[Capability::LogicOp], &["VK_KHR_16bit_storage"], &[vk::QueueFlags::GRAPHICS]),
        ];
        let err = select_candidate(
            candidates,
            &[Capability::GeometryShader],
            &exts(&["VK_KHR_16bit_storage"]),
        )
        .unwrap_err();
        assert!(matches!(err, VkCoreError::NoSuitableDevice));
    }

    #[test]
    fn empty_candidate_list_means_no_device() {
        let err = select_candidate(Vec::new(), &[], &[]).unwrap_err();
        assert!(matches!(err, VkCoreError::NoSuitableDevice));
    }

    #[test]
    fn adopted_check_lists_what_is_missing() {
        let features = requested_features(&[Capability::ShaderInt16]);
        let available = exts(&["VK_KHR_maintenance1"]);

        assert!(check_adopted(&features, &available, &[Capability::ShaderInt16], &exts(&["VK_KHR_maintenance1"])).is_ok());

        match check_adopted(&features, &available, &[Capability::ShaderInt16, Capability::DepthClamp], &[]) {
            Err(VkCoreError::UnsupportedCapability { missing }) => assert_eq!(missing, vec![Capability::DepthClamp]),
            other => panic!("unexpected: {other:?}"),
        }

        match check_adopted(&features, &available, &[], &exts(&["VK_KHR_maintenance1", "VK_KHR_8bit_storage"])) {
            Err(VkCoreError::UnsupportedExtension { missing }) => {
                assert_eq!(missing, vec!["VK_KHR_8bit_storage".to_string()])
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
