//! Per-viewer sandbox state driven by the frame loop
//!
//! Owns the single `VoxelGrid` and hands it by reference to the bridge, the
//! projector and the interactor in a fixed order each frame:
//! drain store events, project instances, pick.

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::core::camera::Camera;
use crate::core::config::SandboxConfig;
use crate::core::error::Error;
use crate::core::types::Result;
use crate::interact::{Intent, PlacementCandidate, PlacementController, PointerEdge, RaycastInteractor};
use crate::math::Ray;
use crate::render::instances::{InstanceProjector, ProjectionReport, RenderInstanceSet};
use crate::sync::{Subscription, SyncBridge, SyncStats, VoxelStore};
use crate::voxel::VoxelGrid;

pub struct Session {
    grid: VoxelGrid,
    instances: RenderInstanceSet,
    projector: InstanceProjector,
    interactor: RaycastInteractor,
    controller: PlacementController,
    bridge: SyncBridge,
    subscription: Option<Subscription>,
    /// Last error shown in the status line
    last_error: Option<String>,
}

impl Session {
    pub fn new(config: &SandboxConfig, store: Arc<dyn VoxelStore>, runtime: Handle) -> Self {
        Self {
            grid: VoxelGrid::new(config.instance_capacity),
            instances: RenderInstanceSet::new(config.instance_capacity, config.world_extent),
            projector: InstanceProjector::new(),
            interactor: RaycastInteractor::from_config(config),
            controller: PlacementController::from_config(config),
            bridge: SyncBridge::new(store, runtime).with_rollback_failed_inserts(config.rollback_failed_inserts),
            subscription: None,
            last_error: None,
        }
    }

    /// Subscribe to realtime changes, then fetch the stored voxels.
    ///
    /// Subscribing first means rows inserted during the load are not missed;
    /// duplicates are removed by the position dedup. A failed subscribe is
    /// returned, but the load is still requested so the session can run
    /// without realtime updates.
    pub fn connect(&mut self) -> Result<()> {
        let subscribed = self.bridge.subscribe();
        self.bridge.request_initial_load();
        match subscribed {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                Ok(())
            }
            Err(e) => {
                self.report_error(&e);
                Err(e)
            }
        }
    }

    /// Stop receiving realtime changes; safe to call repeatedly
    pub fn disconnect(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.bridge.unsubscribe();
    }

    pub fn is_connected(&self) -> bool {
        self.subscription.as_ref().is_some_and(|s| s.is_active())
    }

    /// Frame update from the camera's view ray
    pub fn update(&mut self, camera: &Camera) -> Option<PlacementCandidate> {
        self.update_with_ray(&camera.view_ray())
    }

    /// Drain store events, bring instances up to date and pick along `ray`
    pub fn update_with_ray(&mut self, ray: &Ray) -> Option<PlacementCandidate> {
        self.bridge.pump(&mut self.grid);
        let _ = self.sync_instances();
        self.interactor.cast(ray, &self.instances, &self.grid)
    }

    /// Project pending grid changes into the instance set
    pub fn sync_instances(&mut self) -> Result<ProjectionReport> {
        match self.projector.project(&mut self.instances, &self.grid) {
            Ok(report) => {
                self.grid.mark_clean(report.generation);
                Ok(report)
            }
            Err(e) => {
                self.report_error(&e);
                Err(e)
            }
        }
    }

    /// Resolve a pointer edge against the cached candidate and apply the intent
    pub fn handle_pointer(&mut self, edge: PointerEdge) -> Option<Intent> {
        let intent = self.controller.handle(edge, self.interactor.candidate())?;
        match self.apply_intent(intent) {
            Ok(()) => Some(intent),
            Err(_) => None,
        }
    }

    /// Apply an intent through the bridge; errors are logged and kept for the status line
    pub fn apply_intent(&mut self, intent: Intent) -> Result<()> {
        let result = self.bridge.apply_intent(&mut self.grid, intent);
        match &result {
            Ok(()) => self.last_error = None,
            Err(e) => self.report_error(e),
        }
        result
    }

    fn report_error(&mut self, error: &Error) {
        if error.is_silent() {
            log::debug!("{}", error);
            return;
        }
        let message = error.to_string();
        if self.last_error.as_deref() != Some(message.as_str()) {
            log::warn!("{}", message);
        }
        self.last_error = Some(message);
    }

    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    pub fn instances(&self) -> &RenderInstanceSet {
        &self.instances
    }

    pub fn instances_mut(&mut self) -> &mut RenderInstanceSet {
        &mut self.instances
    }

    pub fn candidate(&self) -> Option<&PlacementCandidate> {
        self.interactor.candidate()
    }

    pub fn controller(&self) -> &PlacementController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut PlacementController {
        &mut self.controller
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.bridge.stats()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{IVec3, Vec3};
    use crate::interact::PointerButton;
    use crate::sync::{MemoryStore, NewVoxel};
    use crate::voxel::{VoxelColor, VoxelId};

    fn session(store: &MemoryStore) -> Session {
        let config = SandboxConfig {
            instance_capacity: 64,
            ..Default::default()
        };
        Session::new(&config, Arc::new(store.clone()), Handle::current())
    }

    #[tokio::test]
    async fn test_add_then_remove_while_hovering() {
        let store = MemoryStore::new();
        let mut session = session(&store);
        assert!(session.grid().is_empty());

        session
            .apply_intent(Intent::Add { cell: IVec3::new(2, 3, -1), color: VoxelColor::ACCENT })
            .unwrap();

        // Looking at the +z face of the new voxel
        let ray = Ray::new(Vec3::new(2.5, 3.5, 6.0), Vec3::NEG_Z);
        let candidate = session.update_with_ray(&ray).unwrap();
        assert_eq!(session.instances().count(), 1);
        assert_eq!(session.instances().instances()[0].translation, [2.0, 3.0, -1.0]);
        assert_eq!(candidate.hovered.unwrap().position, IVec3::new(2, 3, -1));
        assert_eq!(candidate.target_cell, IVec3::new(2, 3, 0));

        let intent = session.handle_pointer(PointerEdge::press(PointerButton::Primary, true));
        assert!(matches!(intent, Some(Intent::Remove { .. })));
        assert!(session.grid().is_empty());

        session.update_with_ray(&ray);
        assert_eq!(session.instances().count(), 0);
    }

    #[tokio::test]
    async fn test_click_on_ground_places_selected_color() {
        let store = MemoryStore::new();
        let mut session = session(&store);
        session.controller_mut().select_color(1);
        let color = session.controller().selected_color();

        let ray = Ray::new(Vec3::new(0.5, 8.0, 0.5), Vec3::NEG_Y);
        session.update_with_ray(&ray);
        session.handle_pointer(PointerEdge::press(PointerButton::Primary, false));
        // Second click hits the new voxel's top face and stacks on it
        session.update_with_ray(&ray);
        session.handle_pointer(PointerEdge::press(PointerButton::Primary, false));

        assert_eq!(session.grid().get(IVec3::new(0, 0, 0)).unwrap().color, color);
        assert!(session.grid().contains(IVec3::new(0, 1, 0)));
        assert_eq!(session.grid().len(), 2);
    }

    #[tokio::test]
    async fn test_connect_loads_and_follows_store() {
        let store = MemoryStore::new();
        let existing = insert_record(&store, IVec3::new(1, 0, 0), VoxelColor::ACCENT).await;

        let mut session = session(&store);
        session.connect().unwrap();
        assert!(session.is_connected());

        // Let the load task run, then drain it
        wait_for(&mut session, |s| s.grid().len() == 1).await;
        assert!(session.grid().get_by_identity(existing).is_some());

        let other = store.clone();
        insert_record(&other, IVec3::new(4, 0, 0), VoxelColor::ACCENT).await;
        wait_for(&mut session, |s| s.grid().len() == 2).await;

        session.disconnect();
        session.disconnect();
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_failed_subscribe_still_loads() {
        let store = MemoryStore::new();
        insert_record(&store, IVec3::new(0, 0, 3), VoxelColor::ACCENT).await;

        let mut session = session(&store);
        store.set_offline(true);
        assert!(session.connect().is_err());
        assert!(!session.is_connected());
        assert!(session.last_error().is_some());

        // The load task has not run yet on this runtime
        store.set_offline(false);
        wait_for(&mut session, |s| s.grid().len() == 1).await;
        assert!(session.grid().contains(IVec3::new(0, 0, 3)));
    }

    #[tokio::test]
    async fn test_capacity_error_is_reported() {
        let store = MemoryStore::new();
        let config = SandboxConfig {
            instance_capacity: 1,
            ..Default::default()
        };
        let mut session = Session::new(&config, Arc::new(store), Handle::current());

        session.apply_intent(Intent::Add { cell: IVec3::ZERO, color: VoxelColor::ACCENT }).unwrap();
        let err = session.apply_intent(Intent::Add { cell: IVec3::ONE, color: VoxelColor::ACCENT });
        assert!(matches!(err, Err(Error::CapacityExceeded { capacity: 1 })));
        assert!(session.last_error().is_some());

        // Occupied stays out of the status line
        session.last_error = None;
        assert!(session.apply_intent(Intent::Add { cell: IVec3::ZERO, color: VoxelColor::ACCENT }).is_err());
        assert!(session.last_error().is_none());
    }

    async fn wait_for(session: &mut Session, done: impl Fn(&Session) -> bool) {
        for _ in 0..100 {
            session.update_with_ray(&Ray::new(Vec3::new(0.0, 10.0, 0.0), Vec3::Y));
            if done(session) {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition not reached");
    }

    async fn insert_record(store: &MemoryStore, position: IVec3, color: VoxelColor) -> VoxelId {
        store.insert(NewVoxel::new(position, color)).await.unwrap()
    }
}
