use std::collections::{BTreeSet, HashMap};

use cowmap::CowMap;

proptest::proptest! {
    #[test]
    fn cowmap_get_consistent(values: BTreeSet<u8>, key: u8) {
        let hash_map: HashMap<u8, u8> = HashMap::from_iter(values.iter().cloned().map(|v| (v, v)));
        let cow_map: CowMap<u8, u8> = values.iter().cloned().map(|v| (v, v)).collect();

        assert_eq!(hash_map.get(&key).copied(), cow_map.get(&key));
        assert_eq!(hash_map.contains_key(&key), cow_map.contains_key(&key));
        assert_eq!(hash_map.len(), cow_map.len());
    }

    #[test]
    fn cowmap_insert_remove_consistent(ops: Vec<(bool, u8, u8)>) {
        let mut model: HashMap<u8, u8> = HashMap::new();
        let cow_map: CowMap<u8, u8> = CowMap::new();

        for (insert, k, v) in ops {
            if insert {
                assert_eq!(model.insert(k, v), cow_map.insert(k, v));
            } else {
                assert_eq!(model.remove(&k), cow_map.remove(&k));
            }
            assert_eq!(model.len(), cow_map.len());
        }

        let read_txn = cow_map.read();
        let mut entries: Vec<(u8, u8)> = read_txn.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_unstable();
        let mut model_entries: Vec<(u8, u8)> = model.into_iter().collect();
        model_entries.sort_unstable();
        assert_eq!(entries, model_entries);
    }

    #[test]
    fn cowmap_replace_all_consistent(before: BTreeSet<u8>, after: BTreeSet<u8>) {
        let cow_map: CowMap<u8, ()> = before.iter().cloned().map(|v| (v, ())).collect();

        let mut mapping = HashMap::with_hasher(Default::default());
        mapping.extend(after.iter().cloned().map(|v| (v, ())));
        cow_map.replace_all(mapping);

        assert_eq!(cow_map.len(), after.len());
        for v in after.iter() {
            assert!(cow_map.contains_key(v));
        }
        for v in before.difference(&after) {
            assert!(!cow_map.contains_key(v));
        }
    }

    #[test]
    fn cowmap_for_each_visits_snapshot(values: BTreeSet<u8>) {
        let cow_map: CowMap<u8, u8> = values.iter().cloned().map(|v| (v, v)).collect();

        let mut visited = BTreeSet::new();
        cow_map.for_each(|k, v| {
            assert_eq!(k, v);
            // A snapshot walk never yields duplicates.
            assert!(visited.insert(*k));
            std::ops::ControlFlow::Continue(())
        });
        assert_eq!(visited, values);
    }
}
