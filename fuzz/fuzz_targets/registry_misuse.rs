#![no_main]

use arbitrary::Arbitrary;
use buddy_registry::BuddyRegistry;
use libfuzzer_sys::fuzz_target;

const TOTAL: usize = 1 << 16;

#[derive(Clone, Debug, Arbitrary)]
enum RegistryOp {
    Allocate(u32),
    Deallocate { addr: u32, size: u32 },
    Release(u32),
}

fuzz_target!(|ops: Vec<RegistryOp>| {
    let mut registry = BuddyRegistry::new(TOTAL).unwrap();

    for op in ops {
        let before = registry.snapshot();
        let rejected = match op {
            RegistryOp::Allocate(size) => registry.allocate(size as usize).is_err(),
            RegistryOp::Deallocate { addr, size } => {
                registry.deallocate(addr as usize, size as usize).is_err()
            }
            RegistryOp::Release(addr) => registry.release(addr as usize).is_err(),
        };

        // Rejected calls never touch the free lists.
        if rejected {
            assert_eq!(registry.snapshot(), before);
        }

        assert_eq!(registry.free_bytes() + registry.used_bytes(), TOTAL);
    }
});
