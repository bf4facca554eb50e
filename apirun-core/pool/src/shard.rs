//! 批量任务分片

/// 按 `下标 % 节点数` 把任务切分成分片
///
/// 分片数为 `min(节点数, 任务数)`，分片内保持任务原有顺序。
/// 节点数为 0 时返回空列表。
pub fn shard_tasks<T>(tasks: Vec<T>, worker_count: usize) -> Vec<Vec<T>> {
    if worker_count == 0 {
        return Vec::new();
    }

    let mut shards: Vec<Vec<T>> = Vec::new();
    for (index, task) in tasks.into_iter().enumerate() {
        let slot = index % worker_count;
        if slot == shards.len() {
            shards.push(Vec::new());
        }
        shards[slot].push(task);
    }
    shards
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seven_over_three() {
        let shards = shard_tasks((0..7).collect::<Vec<_>>(), 3);
        assert_eq!(shards, vec![vec![0, 3, 6], vec![1, 4], vec![2, 5]]);
    }

    #[test]
    fn test_fewer_tasks_than_workers() {
        let shards = shard_tasks(vec!["a", "b"], 5);
        assert_eq!(shards, vec![vec!["a"], vec!["b"]]);
    }

    #[test]
    fn test_no_workers() {
        assert!(shard_tasks(vec![1, 2, 3], 0).is_empty());
        assert!(shard_tasks(Vec::<i32>::new(), 3).is_empty());
    }
}
