#![no_main]

use arbitrary::Arbitrary;
use arena_buddy::BuddyConfig;
use arena_buddy_hater::BuddySubject;
use arena_hater::{AllocatorOp, Evaluator};
use libfuzzer_sys::fuzz_target;

const MAX_LEAF_SHIFT: u8 = 16;
const MAX_LEVELS: u8 = 12;

#[derive(Clone, Debug, Arbitrary)]
struct Args {
    leaf_shift: u8,
    levels: u8,
    ops: Vec<AllocatorOp>,
}

fuzz_target!(|args: Args| {
    let leaf_size = 1 << (args.leaf_shift % (MAX_LEAF_SHIFT + 1));
    let levels = usize::from(args.levels % MAX_LEVELS) + 1;

    let subject = match BuddySubject::new(BuddyConfig::new(leaf_size, levels)) {
        Ok(s) => s,
        Err(_) => return,
    };

    let mut eval = Evaluator::new(subject);
    if let Err(failed) = eval.evaluate(args.ops) {
        panic!("{failed:?}");
    }

    assert!(eval.into_subject().allocator().is_empty());
});
