use crate::model::Module;

/// Address-to-module lookup over a snapshot of the loaded module list.
///
/// Modules are kept sorted by base address (stable, so dump order breaks ties)
/// and zero-sized modules are dropped. Overlapping ranges are tolerated: the
/// first containing module in sorted order wins.
#[derive(Debug, Clone, Default)]
pub struct ModuleIndex {
    modules: Vec<Module>,
    /// `max_end[i]` is the largest range end among `modules[..=i]`.
    max_end: Vec<u64>,
}

impl ModuleIndex {
    pub fn new(modules: &[Module]) -> Self {
        let mut sorted: Vec<Module> = modules.iter().filter(|m| m.size > 0).cloned().collect();
        sorted.sort_by_key(|m| m.base);
        // Same image listed twice at one base.
        sorted.dedup_by(|b, a| a.base == b.base && a.size == b.size && a.name == b.name);

        let mut max_end = Vec::with_capacity(sorted.len());
        let mut running = 0u64;
        for module in &sorted {
            running = running.max(module.end());
            max_end.push(running);
        }
        Self { modules: sorted, max_end }
    }

    /// Module whose range `[base, base + size)` contains `address`.
    pub fn lookup(&self, address: u64) -> Option<&Module> {
        // Candidates all start at or below the address.
        let upper = self.modules.partition_point(|m| m.base <= address);
        // First candidate whose range reaches past the address.
        let first = self.max_end[..upper].partition_point(|&end| end <= address);
        self.modules[..upper].get(first).filter(|m| m.contains(address))
    }

    /// Offset of `address` from the base of its module.
    pub fn resolve(&self, address: u64) -> Option<(&Module, u64)> {
        self.lookup(address).map(|m| (m, address - m.base))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Indexed modules in lookup order.
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }
}
