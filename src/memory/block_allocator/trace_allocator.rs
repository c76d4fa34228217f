use {
    crate::{
        AllocationRequirements, BlockAllocator, DeviceMemoryBlock,
        MemoryProperties, PrettySize, VkalError,
    },
    indoc::indoc,
    std::collections::BTreeMap,
};

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMetrics {
    pub total_blocks: u32,
    pub live_blocks: u32,
    pub live_bytes: u64,
}

impl BlockMetrics {
    fn record_allocation(&mut self, size: u64) {
        self.total_blocks += 1;
        self.live_blocks += 1;
        self.live_bytes += size;
    }

    fn record_free(&mut self, size: u64) {
        self.live_blocks = self.live_blocks.saturating_sub(1);
        self.live_bytes = self.live_bytes.saturating_sub(size);
    }
}

/// A decorator which counts blocks per memory type and logs a report when
/// dropped. Anything still live at that point is a leak.
pub struct TraceAllocator<T: BlockAllocator> {
    wrapped_allocator: T,
    name: String,
    total: BlockMetrics,
    per_type: BTreeMap<usize, BlockMetrics>,
    properties: MemoryProperties,
}

impl<T: BlockAllocator> TraceAllocator<T> {
    pub fn new(
        properties: MemoryProperties,
        wrapped_allocator: T,
        name: impl Into<String>,
    ) -> Self {
        Self {
            wrapped_allocator,
            name: name.into(),
            total: BlockMetrics::default(),
            per_type: BTreeMap::new(),
            properties,
        }
    }

    pub fn total(&self) -> BlockMetrics {
        self.total
    }

    pub fn for_memory_type(&self, memory_type_index: usize) -> BlockMetrics {
        self.per_type
            .get(&memory_type_index)
            .copied()
            .unwrap_or_default()
    }

    pub fn report(&self) -> String {
        let mut report = format!(
            indoc!(
                "
                # {} Block Trace

                total blocks: {}
                live blocks: {}
                live bytes: {}

                "
            ),
            self.name,
            self.total.total_blocks,
            self.total.live_blocks,
            PrettySize(self.total.live_bytes),
        );
        for (memory_type_index, metrics) in self.per_type.iter() {
            report.push_str(&format!(
                indoc!(
                    "
                    ## Memory Type {} {:?}
                    total blocks: {}
                    live blocks: {}

                    "
                ),
                memory_type_index,
                self.properties.flags_for(*memory_type_index),
                metrics.total_blocks,
                metrics.live_blocks,
            ));
        }
        report
    }
}

impl<T: BlockAllocator> Drop for TraceAllocator<T> {
    fn drop(&mut self) {
        if self.total.live_blocks > 0 {
            log::warn!(
                "{} dropped with {} live blocks",
                self.name,
                self.total.live_blocks
            );
        }
        log::debug!("{}", self.report());
    }
}

impl<T: BlockAllocator> BlockAllocator for TraceAllocator<T> {
    unsafe fn allocate(
        &mut self,
        allocation_requirements: AllocationRequirements,
    ) -> Result<DeviceMemoryBlock, VkalError> {
        let block = self.wrapped_allocator.allocate(allocation_requirements)?;
        self.total.record_allocation(block.size());
        self.per_type
            .entry(block.memory_type_index())
            .or_default()
            .record_allocation(block.size());
        Ok(block)
    }

    unsafe fn free(&mut self, block: DeviceMemoryBlock) {
        self.total.record_free(block.size());
        self.per_type
            .entry(block.memory_type_index())
            .or_default()
            .record_free(block.size());
        self.wrapped_allocator.free(block)
    }
}
