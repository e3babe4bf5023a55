/// Merge `items` into an ordered list without near-duplicates.
///
/// Two entries are duplicates when, after trimming and case-folding, one
/// contains the other. The earlier position is kept; when a later entry is the
/// longer one its text replaces the earlier entry in place. Blank entries are
/// dropped.
pub fn dedup_by_containment<I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut kept: Vec<String> = Vec::new();
    let mut keys: Vec<String> = Vec::new();

    for item in items {
        let text = item.trim();
        if text.is_empty() {
            continue;
        }
        let key = text.to_lowercase();

        if keys.iter().any(|existing| existing.contains(&key)) {
            continue;
        }

        match keys.iter().position(|existing| key.contains(existing.as_str())) {
            Some(slot) => {
                kept[slot] = text.to_string();
                keys[slot] = key.clone();
                // the longer entry may also swallow later kept entries
                let mut index = slot + 1;
                while index < keys.len() {
                    if key.contains(keys[index].as_str()) {
                        keys.remove(index);
                        kept.remove(index);
                    } else {
                        index += 1;
                    }
                }
            }
            None => {
                kept.push(text.to_string());
                keys.push(key);
            }
        }
    }

    kept
}
