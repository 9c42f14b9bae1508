use crate::ui::sprite::{
    SpriteStore,
    UpdateParams
};

use super::EngineRole;

/// Service ticked once per frame, before the sprite traversal.
pub trait AutoUpdate {
    fn update(&mut self, store: &mut SpriteStore, params: &UpdateParams);
}

impl<F> AutoUpdate for F
where
    F: FnMut(&mut SpriteStore, &UpdateParams)
{
    fn update(&mut self, store: &mut SpriteStore, params: &UpdateParams) {
        self(store, params)
    }
}

/// Services split by the role they run on.
#[derive(Default)]
pub struct AutoUpdateList {
    server: Vec<Box<dyn AutoUpdate + Send>>,
    client: Vec<Box<dyn AutoUpdate + Send>>,
}

impl AutoUpdateList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, role: EngineRole, service: Box<dyn AutoUpdate + Send>) {
        match role {
            EngineRole::Server => self.server.push(service),
            EngineRole::Client => self.client.push(service),
        }
    }

    pub fn len(&self, role: EngineRole) -> usize {
        match role {
            EngineRole::Server => self.server.len(),
            EngineRole::Client => self.client.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.server.is_empty() && self.client.is_empty()
    }

    pub fn update(&mut self, role: EngineRole, store: &mut SpriteStore, params: &UpdateParams) {
        let services = match role {
            EngineRole::Server => &mut self.server,
            EngineRole::Client => &mut self.client,
        };
        for service in services.iter_mut() {
            service.update(store, params);
        }
    }
}

impl std::fmt::Debug for AutoUpdateList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoUpdateList")
            .field("server", &self.server.len())
            .field("client", &self.client.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_the_role_list_runs() {
        let mut store = SpriteStore::new();
        let root = store.create_root(false);
        let mut list = AutoUpdateList::new();
        list.add(EngineRole::Server, Box::new(move |store: &mut SpriteStore, params: &UpdateParams| {
            if let Some(sprite) = store.get_mut(root) {
                sprite.move_by(glam::Vec3::new(params.delta_time, 0.0, 0.0));
            }
        }));
        assert_eq!(list.len(EngineRole::Server), 1);
        assert_eq!(list.len(EngineRole::Client), 0);

        let params = UpdateParams { delta_time: 2.0, elapsed_time: 2.0 };
        list.update(EngineRole::Client, &mut store, &params);
        assert_eq!(store.get(root).unwrap().position().x, 0.0);
        list.update(EngineRole::Server, &mut store, &params);
        assert_eq!(store.get(root).unwrap().position().x, 2.0);
    }
}
