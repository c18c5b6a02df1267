#![no_main]

use alloc_hater::{AllocatorOp, Evaluator};
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use registry_hater::RegistrySubject;

const MAX_TOTAL_BITS: u8 = 30;

#[derive(Clone, Debug, Arbitrary)]
struct Args {
    total_bits: u8,
    min_bits: u8,
    ops: Vec<AllocatorOp>,
}

fuzz_target!(|args: Args| {
    let total_bits = args.total_bits % (MAX_TOTAL_BITS + 1);
    let min_bits = args.min_bits % (total_bits + 1);

    let subject = match RegistrySubject::with_min_block_size(1 << total_bits, 1 << min_bits) {
        Ok(s) => s,
        Err(_) => return,
    };

    let mut eval = Evaluator::new(subject);
    if let Err(failed) = eval.evaluate(args.ops) {
        panic!("{:?} (after {} ops)", failed.violation, failed.completed.len());
    }

    let subject = eval.into_subject();
    assert_eq!(subject.registry().free_bytes(), 1 << total_bits);
});
