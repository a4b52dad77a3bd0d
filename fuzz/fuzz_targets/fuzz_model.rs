#![no_main]
#[macro_use]
extern crate libfuzzer_sys;
extern crate arbitrary;
extern crate jump_map;

use arbitrary::Arbitrary;

const KEYSPACE: u64 = 255;

#[derive(Debug)]
enum Op {
    Insert { key: u64, value: u64 },
    Remove { key: u64 },
    Cas { key: u64, expected: Option<u64>, new: u64 },
}

impl<'a> Arbitrary<'a> for Op {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(match u.int_in_range(0..=2).unwrap_or(0) {
            0 => Op::Insert {
                key: u.int_in_range(0..=KEYSPACE).unwrap_or(0),
                value: u.int_in_range(0..=KEYSPACE).unwrap_or(0),
            },
            1 => Op::Remove {
                key: u.int_in_range(0..=KEYSPACE).unwrap_or(0),
            },
            _ => Op::Cas {
                key: u.int_in_range(0..=KEYSPACE).unwrap_or(0),
                expected: if bool::arbitrary(u).unwrap_or(false) {
                    Some(u.int_in_range(0..=KEYSPACE).unwrap_or(0))
                } else {
                    None
                },
                new: u.int_in_range(0..=KEYSPACE).unwrap_or(0),
            },
        })
    }
}

fuzz_target!(|ops: Vec<Op>| {
    let map = jump_map::JumpMap::default();
    let mut model = std::collections::HashMap::new();

    for op in ops {
        match op {
            Op::Insert { key, value } => {
                map.insert(key, value);
                model.insert(key, value);
            }
            Op::Remove { key } => {
                map.remove(&key);
                model.remove(&key);
            }
            Op::Cas { key, expected, new } => {
                let swapped = map.cas(key, expected.as_ref(), new);
                assert_eq!(swapped, model.get(&key) == expected.as_ref());
                if swapped {
                    model.insert(key, new);
                }
            }
        }

        assert_eq!(map.len(), model.len() as u64);
        for (key, value) in &model {
            assert_eq!(map.get(key), Some(*value));
        }
    }
});
