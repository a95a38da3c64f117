//! Descriptor declarations, binding tables and descriptor sets.
//!
//! Shaders declare what they read through [`ShaderResource`]s. The
//! application fills a [`DescriptorResourceReference`] with the concrete
//! buffers and image views for each (binding, array element), and a
//! [`DescriptorSet`] turns the two into Vulkan descriptor writes.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{GpuError, Result};
use ash::vk;

/// One descriptor binding a shader reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShaderResource {
    pub set: u32,
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

impl ShaderResource {
    /// A single uniform buffer.
    pub const fn uniform_buffer(set: u32, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        Self {
            set,
            binding,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            count: 1,
            stages,
        }
    }

    /// A fragment-stage input attachment.
    pub const fn input_attachment(set: u32, binding: u32) -> Self {
        Self {
            set,
            binding,
            descriptor_type: vk::DescriptorType::INPUT_ATTACHMENT,
            count: 1,
            stages: vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// A combined image sampler.
    pub const fn combined_image_sampler(
        set: u32,
        binding: u32,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        Self {
            set,
            binding,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            count: 1,
            stages,
        }
    }

    /// Turn the binding into an array of `count` descriptors.
    #[must_use]
    pub const fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }
}

/// Returns true for descriptor types backed by a buffer.
pub fn is_buffer_descriptor(descriptor_type: vk::DescriptorType) -> bool {
    matches!(
        descriptor_type,
        vk::DescriptorType::UNIFORM_BUFFER
            | vk::DescriptorType::STORAGE_BUFFER
            | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
            | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
    )
}

/// A concrete resource bound at one (binding, array element).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceBinding {
    Buffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    },
    Image {
        view: vk::ImageView,
        sampler: Option<vk::Sampler>,
    },
}

/// Binding table: binding → array element → resource.
#[derive(Clone, Debug, Default)]
pub struct DescriptorResourceReference {
    bindings: BTreeMap<u32, BTreeMap<u32, ResourceBinding>>,
}

impl DescriptorResourceReference {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, binding: u32, array_element: u32, resource: ResourceBinding) {
        self.bindings
            .entry(binding)
            .or_default()
            .insert(array_element, resource);
    }

    /// Bind a buffer range, replacing whatever was there.
    pub fn bind_buffer(
        &mut self,
        binding: u32,
        array_element: u32,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) {
        self.insert(
            binding,
            array_element,
            ResourceBinding::Buffer {
                buffer,
                offset,
                range,
            },
        );
    }

    /// Bind a sampled image, replacing whatever was there.
    pub fn bind_image(
        &mut self,
        binding: u32,
        array_element: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) {
        self.insert(
            binding,
            array_element,
            ResourceBinding::Image {
                view,
                sampler: Some(sampler),
            },
        );
    }

    /// Bind an input attachment view, replacing whatever was there.
    pub fn bind_input_image(&mut self, binding: u32, array_element: u32, view: vk::ImageView) {
        self.insert(
            binding,
            array_element,
            ResourceBinding::Image {
                view,
                sampler: None,
            },
        );
    }

    /// Look up one entry.
    pub fn get(&self, binding: u32, array_element: u32) -> Option<&ResourceBinding> {
        self.bindings.get(&binding)?.get(&array_element)
    }

    /// Entries ordered by binding, then array element.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, &ResourceBinding)> {
        self.bindings.iter().flat_map(|(&binding, elements)| {
            elements
                .iter()
                .map(move |(&element, resource)| (binding, element, resource))
        })
    }

    /// Total number of bound entries.
    pub fn len(&self) -> usize {
        self.bindings.values().map(BTreeMap::len).sum()
    }

    /// Returns true if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, binding: u32, array_element: u32) -> Result<&ResourceBinding> {
        self.get(binding, array_element).ok_or_else(|| {
            GpuError::ResourceNotFound(format!(
                "nothing bound at binding {binding}, array element {array_element}"
            ))
        })
    }

    /// Buffer info for the entry at (binding, array element).
    pub fn generate_descriptor_buffer_info(
        &self,
        binding: u32,
        array_element: u32,
    ) -> Result<vk::DescriptorBufferInfo> {
        match *self.lookup(binding, array_element)? {
            ResourceBinding::Buffer {
                buffer,
                offset,
                range,
            } => Ok(vk::DescriptorBufferInfo {
                buffer,
                offset,
                range,
            }),
            ResourceBinding::Image { .. } => Err(GpuError::BindingMismatch(format!(
                "binding {binding}[{array_element}] holds an image, a buffer was requested"
            ))),
        }
    }

    /// Image info for the entry at (binding, array element), in
    /// `SHADER_READ_ONLY_OPTIMAL`.
    pub fn generate_descriptor_image_info(
        &self,
        binding: u32,
        array_element: u32,
    ) -> Result<vk::DescriptorImageInfo> {
        match *self.lookup(binding, array_element)? {
            ResourceBinding::Image { view, sampler } => Ok(vk::DescriptorImageInfo {
                sampler: sampler.unwrap_or_default(),
                image_view: view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }),
            ResourceBinding::Buffer { .. } => Err(GpuError::BindingMismatch(format!(
                "binding {binding}[{array_element}] holds a buffer, an image was requested"
            ))),
        }
    }
}

/// Descriptor info for one staged write.
#[derive(Clone, Copy, Debug)]
pub enum StagedInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

/// A descriptor write waiting to be applied.
#[derive(Clone, Copy, Debug)]
pub struct StagedWrite {
    pub binding: u32,
    pub array_element: u32,
    pub descriptor_type: vk::DescriptorType,
    pub info: StagedInfo,
}

/// Build one write per bound entry, typed by the declared resource and
/// ordered by binding, then array element.
pub fn stage_writes(
    resources: &[ShaderResource],
    reference: &DescriptorResourceReference,
) -> Result<Vec<StagedWrite>> {
    reference
        .iter()
        .map(|(binding, array_element, _)| {
            let declared = resources
                .iter()
                .find(|r| r.binding == binding)
                .ok_or_else(|| {
                    GpuError::ResourceNotFound(format!(
                        "binding {binding} is not declared by the set layout"
                    ))
                })?;

            if array_element >= declared.count {
                return Err(GpuError::BindingMismatch(format!(
                    "binding {binding} has {} elements, element {array_element} was bound",
                    declared.count
                )));
            }

            let info = if is_buffer_descriptor(declared.descriptor_type) {
                StagedInfo::Buffer(reference.generate_descriptor_buffer_info(binding, array_element)?)
            } else {
                StagedInfo::Image(reference.generate_descriptor_image_info(binding, array_element)?)
            };

            Ok(StagedWrite {
                binding,
                array_element,
                descriptor_type: declared.descriptor_type,
                info,
            })
        })
        .collect()
}

/// Writes targeting `bindings`, or all of them when `bindings` is empty.
pub(crate) fn select_writes<'a>(
    writes: &'a [StagedWrite],
    bindings: &'a [u32],
) -> impl Iterator<Item = &'a StagedWrite> + 'a {
    writes
        .iter()
        .filter(move |w| bindings.is_empty() || bindings.contains(&w.binding))
}

/// Vulkan binding descriptions for `resources`.
pub fn layout_bindings(resources: &[ShaderResource]) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
    resources
        .iter()
        .map(|r| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(r.binding)
                .descriptor_type(r.descriptor_type)
                .descriptor_count(r.count)
                .stage_flags(r.stages)
        })
        .collect()
}

/// Descriptor counts needed for `sets_each` sets of every layout in `layouts`.
///
/// Types appear in first-seen order.
pub fn pool_sizes<'a>(
    layouts: impl IntoIterator<Item = &'a [ShaderResource]>,
    sets_each: u32,
) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();

    for resource in layouts.into_iter().flatten() {
        let count = resource.count * sets_each;
        match sizes.iter_mut().find(|s| s.ty == resource.descriptor_type) {
            Some(size) => size.descriptor_count += count,
            None => sizes.push(vk::DescriptorPoolSize {
                ty: resource.descriptor_type,
                descriptor_count: count,
            }),
        }
    }

    sizes
}

/// Descriptor set layout that remembers its declared resources.
pub struct DescriptorSetLayout {
    device: Arc<ash::Device>,
    layout: vk::DescriptorSetLayout,
    resources: Vec<ShaderResource>,
}

impl DescriptorSetLayout {
    /// Create the layout for `set` from every resource declared for it.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: Arc<ash::Device>,
        set: u32,
        resources: &[ShaderResource],
    ) -> Result<Self> {
        let mut resources: Vec<ShaderResource> =
            resources.iter().filter(|r| r.set == set).copied().collect();
        resources.sort_by_key(|r| r.binding);

        let bindings = layout_bindings(&resources);
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = device.create_descriptor_set_layout(&layout_info, None)?;

        Ok(Self {
            device,
            layout,
            resources,
        })
    }

    /// Get the raw layout handle.
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Declared resources, sorted by binding.
    pub fn resources(&self) -> &[ShaderResource] {
        &self.resources
    }

    /// Declared type of `binding`.
    pub fn descriptor_type(&self, binding: u32) -> Option<vk::DescriptorType> {
        self.resources
            .iter()
            .find(|r| r.binding == binding)
            .map(|r| r.descriptor_type)
    }

    /// Destroy the layout.
    ///
    /// # Safety
    /// No pipeline layout or set allocation may still need it.
    pub unsafe fn destroy(&self) {
        self.device.destroy_descriptor_set_layout(self.layout, None);
    }
}

/// Allocation counter for a pool with a fixed set budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetBudget {
    max_sets: u32,
    allocated: u32,
}

impl SetBudget {
    pub const fn new(max_sets: u32) -> Self {
        Self {
            max_sets,
            allocated: 0,
        }
    }

    /// Claim one set.
    ///
    /// # Panics
    /// Panics when the budget is exhausted.
    pub fn take(&mut self) {
        self.ensure_available();
        self.allocated += 1;
    }

    /// Run `allocate` and claim one set only if it succeeds.
    ///
    /// # Panics
    /// Panics when the budget is exhausted, before `allocate` runs.
    pub fn take_with<T>(&mut self, allocate: impl FnOnce() -> Result<T>) -> Result<T> {
        self.ensure_available();
        let value = allocate()?;
        self.allocated += 1;
        Ok(value)
    }

    fn ensure_available(&self) {
        assert!(
            self.allocated < self.max_sets,
            "descriptor pool over-allocation: all {} sets already allocated",
            self.max_sets
        );
    }

    pub const fn remaining(&self) -> u32 {
        self.max_sets - self.allocated
    }
}

/// Descriptor pool for allocating descriptor sets.
pub struct DescriptorPool {
    device: Arc<ash::Device>,
    pool: vk::DescriptorPool,
    budget: SetBudget,
}

impl DescriptorPool {
    /// Create a new descriptor pool.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: Arc<ash::Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = device.create_descriptor_pool(&create_info, None)?;
        tracing::debug!(max_sets, "Descriptor pool created");

        Ok(Self {
            device,
            pool,
            budget: SetBudget::new(max_sets),
        })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Sets that can still be allocated.
    pub fn remaining(&self) -> u32 {
        self.budget.remaining()
    }

    /// Allocate one set with `layout`.
    ///
    /// # Panics
    /// Panics if the pool's declared set count is exhausted.
    ///
    /// # Safety
    /// The layout must be valid.
    pub unsafe fn allocate(&mut self, layout: &DescriptorSetLayout) -> Result<vk::DescriptorSet> {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let device = &self.device;
        self.budget.take_with(|| {
            let sets = unsafe { device.allocate_descriptor_sets(&alloc_info)? };
            Ok(sets[0])
        })
    }

    /// Destroy the pool and every set allocated from it.
    ///
    /// # Safety
    /// No set from this pool may be in use.
    pub unsafe fn destroy(&self) {
        self.device.destroy_descriptor_pool(self.pool, None);
    }
}

/// An allocated descriptor set with its staged writes.
pub struct DescriptorSet {
    device: Arc<ash::Device>,
    handle: vk::DescriptorSet,
    writes: Vec<StagedWrite>,
}

impl DescriptorSet {
    /// Allocate a set from `pool` and stage writes for every entry of `reference`.
    ///
    /// Nothing is written to the device until [`DescriptorSet::update`].
    ///
    /// # Safety
    /// The layout and pool must be valid.
    pub unsafe fn new(
        layout: &DescriptorSetLayout,
        pool: &mut DescriptorPool,
        reference: &DescriptorResourceReference,
    ) -> Result<Self> {
        let writes = stage_writes(layout.resources(), reference)?;
        let handle = pool.allocate(layout)?;

        Ok(Self {
            device: Arc::clone(&layout.device),
            handle,
            writes,
        })
    }

    /// Get the raw set handle.
    pub fn handle(&self) -> vk::DescriptorSet {
        self.handle
    }

    /// Apply the staged writes for `bindings`, or every staged write when
    /// `bindings` is empty.
    ///
    /// # Safety
    /// The set must not be in use by a pending command buffer.
    pub unsafe fn update(&self, bindings: &[u32]) {
        let writes: Vec<vk::WriteDescriptorSet> = select_writes(&self.writes, bindings)
            .map(|w| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(self.handle)
                    .dst_binding(w.binding)
                    .dst_array_element(w.array_element)
                    .descriptor_type(w.descriptor_type);
                match &w.info {
                    StagedInfo::Buffer(info) => write.buffer_info(std::slice::from_ref(info)),
                    StagedInfo::Image(info) => write.image_info(std::slice::from_ref(info)),
                }
            })
            .collect();

        if !writes.is_empty() {
            self.device.update_descriptor_sets(&writes, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn buffer(raw: u64) -> vk::Buffer {
        vk::Buffer::from_raw(raw)
    }

    fn view(raw: u64) -> vk::ImageView {
        vk::ImageView::from_raw(raw)
    }

    #[test]
    fn buffer_info_round_trip() {
        let mut reference = DescriptorResourceReference::new();
        reference.bind_buffer(0, 0, buffer(7), 64, 256);

        let info = reference.generate_descriptor_buffer_info(0, 0).unwrap();

        assert_eq!(info.buffer, buffer(7));
        assert_eq!(info.offset, 64);
        assert_eq!(info.range, 256);
    }

    #[test]
    fn input_image_info_is_shader_read_only() {
        let mut reference = DescriptorResourceReference::new();
        reference.bind_input_image(2, 0, view(9));

        let info = reference.generate_descriptor_image_info(2, 0).unwrap();

        assert_eq!(info.image_view, view(9));
        assert_eq!(info.sampler, vk::Sampler::null());
        assert_eq!(info.image_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn kind_mismatch_is_an_error() {
        let mut reference = DescriptorResourceReference::new();
        reference.bind_input_image(0, 0, view(1));
        reference.bind_buffer(1, 0, buffer(2), 0, 16);

        assert!(matches!(
            reference.generate_descriptor_buffer_info(0, 0),
            Err(GpuError::BindingMismatch(_))
        ));
        assert!(matches!(
            reference.generate_descriptor_image_info(1, 0),
            Err(GpuError::BindingMismatch(_))
        ));
    }

    #[test]
    fn missing_entry_is_not_found() {
        let reference = DescriptorResourceReference::new();
        assert!(matches!(
            reference.generate_descriptor_buffer_info(3, 1),
            Err(GpuError::ResourceNotFound(_))
        ));
    }

    #[test]
    fn binding_overwrites() {
        let mut reference = DescriptorResourceReference::new();
        reference.bind_buffer(0, 0, buffer(1), 0, 16);
        reference.bind_input_image(0, 0, view(5));

        assert_eq!(reference.len(), 1);
        assert_eq!(
            reference.get(0, 0),
            Some(&ResourceBinding::Image {
                view: view(5),
                sampler: None
            })
        );
    }

    #[test]
    fn writes_staged_in_binding_then_element_order() {
        let resources = [
            ShaderResource::uniform_buffer(0, 0, vk::ShaderStageFlags::VERTEX),
            ShaderResource::input_attachment(0, 1).with_count(2),
            ShaderResource::input_attachment(0, 2),
        ];
        let mut reference = DescriptorResourceReference::new();
        reference.bind_input_image(2, 0, view(30));
        reference.bind_input_image(1, 1, view(21));
        reference.bind_buffer(0, 0, buffer(10), 0, 64);
        reference.bind_input_image(1, 0, view(20));

        let writes = stage_writes(&resources, &reference).unwrap();

        let order: Vec<_> = writes.iter().map(|w| (w.binding, w.array_element)).collect();
        assert_eq!(order, vec![(0, 0), (1, 0), (1, 1), (2, 0)]);
        assert_eq!(writes[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert!(matches!(writes[0].info, StagedInfo::Buffer(_)));
        for write in &writes[1..] {
            assert_eq!(write.descriptor_type, vk::DescriptorType::INPUT_ATTACHMENT);
            assert!(matches!(write.info, StagedInfo::Image(_)));
        }
    }

    fn three_binding_writes() -> Vec<StagedWrite> {
        let resources = [
            ShaderResource::uniform_buffer(0, 0, vk::ShaderStageFlags::FRAGMENT),
            ShaderResource::input_attachment(0, 1).with_count(2),
            ShaderResource::input_attachment(0, 2),
        ];
        let mut reference = DescriptorResourceReference::new();
        reference.bind_buffer(0, 0, buffer(10), 0, 64);
        reference.bind_input_image(1, 0, view(20));
        reference.bind_input_image(1, 1, view(21));
        reference.bind_input_image(2, 0, view(30));
        stage_writes(&resources, &reference).unwrap()
    }

    #[test]
    fn empty_subset_selects_every_write() {
        let writes = three_binding_writes();

        let selected: Vec<_> = select_writes(&writes, &[])
            .map(|w| (w.binding, w.array_element))
            .collect();

        assert_eq!(selected, vec![(0, 0), (1, 0), (1, 1), (2, 0)]);
    }

    #[test]
    fn subset_selects_all_elements_of_listed_bindings() {
        let writes = three_binding_writes();

        let selected: Vec<_> = select_writes(&writes, &[1]).collect();

        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|w| w.binding == 1));
        assert_eq!(selected[0].array_element, 0);
        assert_eq!(selected[1].array_element, 1);
        match selected[1].info {
            StagedInfo::Image(info) => assert_eq!(info.image_view, view(21)),
            StagedInfo::Buffer(_) => panic!("binding 1 is an input attachment"),
        }
    }

    #[test]
    fn subset_with_unbound_binding_selects_nothing() {
        let writes = three_binding_writes();
        assert_eq!(select_writes(&writes, &[7]).count(), 0);
    }

    #[test]
    fn staging_rejects_kind_mismatch() {
        let resources = [ShaderResource::uniform_buffer(
            0,
            0,
            vk::ShaderStageFlags::FRAGMENT,
        )];
        let mut reference = DescriptorResourceReference::new();
        reference.bind_input_image(0, 0, view(1));

        assert!(matches!(
            stage_writes(&resources, &reference),
            Err(GpuError::BindingMismatch(_))
        ));
    }

    #[test]
    fn staging_rejects_undeclared_binding() {
        let resources = [ShaderResource::input_attachment(0, 0)];
        let mut reference = DescriptorResourceReference::new();
        reference.bind_input_image(4, 0, view(1));

        assert!(matches!(
            stage_writes(&resources, &reference),
            Err(GpuError::ResourceNotFound(_))
        ));
    }

    #[test]
    fn staging_rejects_element_past_count() {
        let resources = [ShaderResource::input_attachment(0, 0)];
        let mut reference = DescriptorResourceReference::new();
        reference.bind_input_image(0, 1, view(1));

        assert!(stage_writes(&resources, &reference).is_err());
    }

    #[test]
    fn pool_sizes_sum_per_type() {
        let frame = [ShaderResource::uniform_buffer(
            0,
            0,
            vk::ShaderStageFlags::VERTEX,
        )];
        let lighting = [
            ShaderResource::input_attachment(0, 0),
            ShaderResource::input_attachment(0, 1),
            ShaderResource::uniform_buffer(0, 2, vk::ShaderStageFlags::FRAGMENT),
        ];

        let sizes = pool_sizes([&frame[..], &lighting[..]], 3);

        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 6);
        assert_eq!(sizes[1].ty, vk::DescriptorType::INPUT_ATTACHMENT);
        assert_eq!(sizes[1].descriptor_count, 6);
    }

    #[test]
    fn layout_bindings_follow_declarations() {
        let resources = [
            ShaderResource::combined_image_sampler(1, 0, vk::ShaderStageFlags::FRAGMENT)
                .with_count(4),
        ];

        let bindings = layout_bindings(&resources);

        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].binding, 0);
        assert_eq!(bindings[0].descriptor_count, 4);
        assert_eq!(
            bindings[0].descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }

    #[test]
    fn set_budget_counts_down() {
        let mut budget = SetBudget::new(2);
        budget.take();
        assert_eq!(budget.remaining(), 1);
        budget.take();
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn failed_allocation_keeps_budget() {
        let mut budget = SetBudget::new(1);

        let failed: Result<u32> = budget.take_with(|| {
            Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_POOL_MEMORY))
        });

        assert!(failed.is_err());
        assert_eq!(budget.remaining(), 1);
        assert_eq!(budget.take_with(|| Ok(5)).unwrap(), 5);
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    #[should_panic(expected = "over-allocation")]
    fn exhausted_budget_panics_before_allocating() {
        let mut budget = SetBudget::new(0);
        let _ = budget.take_with(|| -> Result<()> { unreachable!("allocation must not run") });
    }

    #[test]
    #[should_panic(expected = "over-allocation")]
    fn set_budget_overflow_panics() {
        let mut budget = SetBudget::new(1);
        budget.take();
        budget.take();
    }
}
