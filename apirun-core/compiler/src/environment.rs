//! 场景环境解析

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::model::EnvBinding;
use crate::source::{Environment, EnvironmentService, ScenarioBlob};
use crate::Result;

/// 环境模式: 环境 ID 或环境组 ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentMode {
    pub environment_id: String,
    pub grouped: bool,
}

impl EnvironmentMode {
    pub fn new(environment_id: Option<&str>, grouped: bool) -> Option<Self> {
        environment_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| Self {
                environment_id: id.to_string(),
                grouped,
            })
    }

    pub fn from_scenario_blob(blob: &ScenarioBlob) -> Option<Self> {
        Self::new(blob.environment_id.as_deref(), blob.grouped)
    }
}

/// 一次编译用到的全部环境
#[derive(Debug, Default)]
pub struct EnvironmentIndex {
    environments: HashMap<String, Environment>,
    groups: HashMap<String, Vec<String>>,
}

impl EnvironmentIndex {
    /// 批量加载: 一次查询环境组成员，一次查询环境
    pub async fn load(
        service: &dyn EnvironmentService,
        modes: impl IntoIterator<Item = EnvironmentMode>,
    ) -> Result<Self> {
        let mut env_ids: Vec<String> = Vec::new();
        let mut group_ids: Vec<String> = Vec::new();
        for mode in modes {
            let target = if mode.grouped {
                &mut group_ids
            } else {
                &mut env_ids
            };
            if !target.contains(&mode.environment_id) {
                target.push(mode.environment_id);
            }
        }

        let groups = if group_ids.is_empty() {
            HashMap::new()
        } else {
            service.get_environment_group_members(&group_ids).await?
        };

        for members in groups.values() {
            for id in members {
                if !env_ids.contains(id) {
                    env_ids.push(id.clone());
                }
            }
        }

        let environments = if env_ids.is_empty() {
            HashMap::new()
        } else {
            service
                .get_environments(&env_ids)
                .await?
                .into_iter()
                .map(|env| (env.id.clone(), env))
                .collect()
        };

        debug!(
            "加载环境 {} 个，环境组 {} 个",
            environments.len(),
            groups.len()
        );
        Ok(Self {
            environments,
            groups,
        })
    }

    /// 环境模式对应的环境绑定；环境已删除时返回 None
    pub fn binding(&self, mode: &EnvironmentMode) -> Option<EnvBinding> {
        if mode.grouped {
            let Some(members) = self.groups.get(&mode.environment_id) else {
                warn!("环境组 {} 不存在", mode.environment_id);
                return None;
            };
            let project_env_map: BTreeMap<String, Environment> = members
                .iter()
                .filter_map(|id| self.environments.get(id))
                .map(|env| (env.project_id.clone(), env.clone()))
                .collect();
            Some(EnvBinding::Group {
                group_id: mode.environment_id.clone(),
                project_env_map,
            })
        } else {
            match self.environments.get(&mode.environment_id) {
                Some(environment) => Some(EnvBinding::Single {
                    environment: environment.clone(),
                }),
                None => {
                    warn!("环境 {} 不存在", mode.environment_id);
                    None
                }
            }
        }
    }
}
