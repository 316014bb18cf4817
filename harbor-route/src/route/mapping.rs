use harbor_core::GlobalModelMapping;
use std::collections::HashSet;

/// 单个模型按映射表展开一次
///
/// 单向映射优先于等效组；等效组按配置顺序首个命中生效；
/// 都未命中时模型映射到自身。
fn resolve_single(model: &str, mapping: &GlobalModelMapping) -> Vec<String> {
    if let Some(targets) = mapping.one_way.get(model) {
        // 映射到空列表视为没有映射
        if !targets.is_empty() {
            return targets.clone();
        }
    }

    for group in &mapping.equivalents {
        if group.iter().any(|m| m == model) {
            return group.clone();
        }
    }

    vec![model.to_string()]
}

/// 迭代求模型映射的不动点
///
/// 返回 `(目标模型集合, 是否用到了映射)`。已展开过的模型不再展开，
/// 最多迭代 5 轮，环状配置（a→b→c→a）不会发散。没有任何映射命中时
/// 结果就是原模型本身。
pub fn resolve_model_mapping(model: &str, mapping: &GlobalModelMapping) -> (Vec<String>, bool) {
    const MAX_ITERATIONS: usize = 5;

    let mut processed: HashSet<String> = HashSet::new();
    let mut current: Vec<String> = vec![model.to_string()];
    let mut used_mapping = false;

    for _ in 0..MAX_ITERATIONS {
        let mut next: Vec<String> = Vec::new();
        let mut has_new_mappings = false;

        for current_model in &current {
            if processed.contains(current_model) {
                continue;
            }

            let mapped = resolve_single(current_model, mapping);
            processed.insert(current_model.clone());

            if mapped.len() == 1 && mapped[0] == *current_model {
                // 映射到自身不算新信息
                next.push(current_model.clone());
            } else {
                used_mapping = true;
                has_new_mappings = true;
                for mapped_model in mapped {
                    if !processed.contains(&mapped_model) {
                        next.push(mapped_model);
                    }
                }
            }
        }

        // 没有产生新映射说明已经收敛
        if !has_new_mappings {
            break;
        }
        current = next;
    }

    if !used_mapping {
        return (vec![model.to_string()], false);
    }

    let mut final_models: Vec<String> = processed.into_iter().collect();
    final_models.sort();
    (final_models, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn one_way(entries: &[(&str, &[&str])]) -> GlobalModelMapping {
        let mut map = HashMap::new();
        for (entry, targets) in entries {
            map.insert(
                entry.to_string(),
                targets.iter().map(|t| t.to_string()).collect(),
            );
        }
        GlobalModelMapping {
            equivalents: Vec::new(),
            one_way: map,
        }
    }

    fn equivalents(groups: &[&[&str]]) -> GlobalModelMapping {
        GlobalModelMapping {
            equivalents: groups
                .iter()
                .map(|g| g.iter().map(|m| m.to_string()).collect())
                .collect(),
            one_way: HashMap::new(),
        }
    }

    fn resolve_sorted(model: &str, mapping: &GlobalModelMapping) -> (Vec<String>, bool) {
        let (mut models, used) = resolve_model_mapping(model, mapping);
        models.sort();
        (models, used)
    }

    #[test]
    fn test_no_mapping_returns_original() {
        let mapping = GlobalModelMapping::default();
        let (models, used) = resolve_sorted("gpt-4", &mapping);
        assert_eq!(models, vec!["gpt-4"]);
        assert!(!used);
    }

    #[test]
    fn test_one_way_single_target() {
        let mapping = one_way(&[("gpt-4", &["gpt-4-turbo"])]);
        let (models, used) = resolve_sorted("gpt-4", &mapping);
        assert_eq!(models, vec!["gpt-4", "gpt-4-turbo"]);
        assert!(used);
    }

    #[test]
    fn test_one_way_multiple_targets() {
        let mapping = one_way(&[("gpt-4", &["gpt-4-turbo", "gpt-4-32k"])]);
        let (models, used) = resolve_sorted("gpt-4", &mapping);
        assert_eq!(models, vec!["gpt-4", "gpt-4-32k", "gpt-4-turbo"]);
        assert!(used);
    }

    #[test]
    fn test_equivalents_hit() {
        let mapping = equivalents(&[&["gpt-3.5-turbo", "gpt-3.5-turbo-16k", "gpt-3.5-turbo-0613"]]);
        let (models, used) = resolve_sorted("gpt-3.5-turbo", &mapping);
        assert_eq!(
            models,
            vec!["gpt-3.5-turbo", "gpt-3.5-turbo-0613", "gpt-3.5-turbo-16k"]
        );
        assert!(used);
    }

    #[test]
    fn test_equivalents_miss() {
        let mapping = equivalents(&[&["gpt-3.5-turbo", "gpt-3.5-turbo-16k"]]);
        let (models, used) = resolve_sorted("claude-2", &mapping);
        assert_eq!(models, vec!["claude-2"]);
        assert!(!used);
    }

    #[test]
    fn test_two_level_chain() {
        let mapping = one_way(&[
            ("gpt-4", &["gpt-4-turbo"]),
            ("gpt-4-turbo", &["gpt-4-turbo-preview"]),
        ]);
        let (models, used) = resolve_sorted("gpt-4", &mapping);
        assert_eq!(models, vec!["gpt-4", "gpt-4-turbo", "gpt-4-turbo-preview"]);
        assert!(used);
    }

    #[test]
    fn test_three_level_chain() {
        let mapping = one_way(&[
            ("gpt-4", &["gpt-4-turbo"]),
            ("gpt-4-turbo", &["gpt-4-turbo-preview"]),
            ("gpt-4-turbo-preview", &["gpt-4-0125-preview"]),
        ]);
        let (models, used) = resolve_sorted("gpt-4", &mapping);
        assert_eq!(
            models,
            vec![
                "gpt-4",
                "gpt-4-0125-preview",
                "gpt-4-turbo",
                "gpt-4-turbo-preview"
            ]
        );
        assert!(used);
    }

    #[test]
    fn test_mixed_one_way_and_equivalents() {
        let mut mapping = one_way(&[("gpt-4", &["gpt-4-turbo"])]);
        mapping.equivalents = vec![vec![
            "gpt-4-turbo".to_string(),
            "gpt-4-turbo-preview".to_string(),
            "gpt-4-1106-preview".to_string(),
        ]];
        let (models, used) = resolve_sorted("gpt-4", &mapping);
        assert_eq!(
            models,
            vec![
                "gpt-4",
                "gpt-4-1106-preview",
                "gpt-4-turbo",
                "gpt-4-turbo-preview"
            ]
        );
        assert!(used);
    }

    #[test]
    fn test_cycle_terminates() {
        let mapping = one_way(&[
            ("model-a", &["model-b"]),
            ("model-b", &["model-c"]),
            // 环回到 model-a
            ("model-c", &["model-a"]),
        ]);
        let (models, used) = resolve_sorted("model-a", &mapping);
        assert_eq!(models, vec!["model-a", "model-b", "model-c"]);
        assert!(used);
    }

    #[test]
    fn test_fan_out_graph() {
        let mapping = one_way(&[
            ("base-model", &["branch-a", "branch-b"]),
            ("branch-a", &["leaf-a1", "leaf-a2"]),
            ("branch-b", &["leaf-b1"]),
        ]);
        let (models, used) = resolve_sorted("base-model", &mapping);
        assert_eq!(
            models,
            vec![
                "base-model",
                "branch-a",
                "branch-b",
                "leaf-a1",
                "leaf-a2",
                "leaf-b1"
            ]
        );
        assert!(used);
    }

    #[test]
    fn test_one_way_takes_precedence_over_equivalents() {
        let mut mapping = one_way(&[("test-model", &["oneway-target"])]);
        mapping.equivalents = vec![vec![
            "test-model".to_string(),
            "equivalent-target".to_string(),
        ]];
        let (models, used) = resolve_sorted("test-model", &mapping);
        assert_eq!(models, vec!["oneway-target", "test-model"]);
        assert!(used);
    }

    #[test]
    fn test_iteration_ceiling_truncates_deep_chains() {
        let mapping = one_way(&[
            ("level-0", &["level-1"]),
            ("level-1", &["level-2"]),
            ("level-2", &["level-3"]),
            ("level-3", &["level-4"]),
            ("level-4", &["level-5"]),
            ("level-5", &["level-6"]),
        ]);
        // 第 5 轮结束时 level-5 尚未展开，结果止步于 level-4
        let (models, used) = resolve_sorted("level-0", &mapping);
        assert_eq!(
            models,
            vec!["level-0", "level-1", "level-2", "level-3", "level-4"]
        );
        assert!(used);
    }

    #[test]
    fn test_empty_target_list_counts_as_no_mapping() {
        let mapping = one_way(&[("test-model", &[])]);
        let (models, used) = resolve_sorted("test-model", &mapping);
        assert_eq!(models, vec!["test-model"]);
        assert!(!used);
    }

    #[test]
    fn test_self_mapping_counts_as_no_mapping() {
        let mapping = one_way(&[("self-ref", &["self-ref"])]);
        let (models, used) = resolve_sorted("self-ref", &mapping);
        assert_eq!(models, vec!["self-ref"]);
        assert!(!used);
    }

    #[test]
    fn test_single_member_equivalence_group() {
        let mapping = equivalents(&[&["single-model"]]);
        let (models, used) = resolve_sorted("single-model", &mapping);
        assert_eq!(models, vec!["single-model"]);
        assert!(!used);
    }

    #[test]
    fn test_multiple_cycle_paths() {
        let mapping = one_way(&[
            ("hub", &["branch-1", "branch-2"]),
            ("branch-1", &["hub"]),
            ("branch-2", &["branch-1"]),
        ]);
        let (models, used) = resolve_sorted("hub", &mapping);
        assert_eq!(models, vec!["branch-1", "branch-2", "hub"]);
        assert!(used);
    }

    #[test]
    fn test_only_matching_equivalence_group_applies() {
        let mapping = equivalents(&[
            &["group-1-a", "group-1-b"],
            &["target-model", "group-2-b", "group-2-c"],
            &["group-3-a", "group-3-b"],
        ]);
        let (models, used) = resolve_sorted("target-model", &mapping);
        assert_eq!(models, vec!["group-2-b", "group-2-c", "target-model"]);
        assert!(used);
    }

    #[test]
    fn test_resolve_single_one_way_precedence() {
        let mut mapping = one_way(&[("test-model", &["oneway-result"])]);
        mapping.equivalents = vec![vec![
            "test-model".to_string(),
            "equivalent-result".to_string(),
        ]];
        assert_eq!(resolve_single("test-model", &mapping), vec!["oneway-result"]);
    }

    #[test]
    fn test_resolve_single_falls_back_to_self() {
        let mapping = GlobalModelMapping::default();
        assert_eq!(resolve_single("test-model", &mapping), vec!["test-model"]);
    }
}
