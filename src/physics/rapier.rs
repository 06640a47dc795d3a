//! rapier3d Backend
//!
//! Owns the rapier world. Players are kinematic position-based capsules
//! driven by validated moves, map geometry is fixed, anything with mass and
//! no static flag is dynamic. Each collider stores its entity id in
//! `user_data` so ray and contact results map back without a side table.

use std::collections::BTreeMap;

use rapier3d::prelude::*;
use tracing::{debug, warn};

use crate::core::vec3::Vec3;
use crate::physics::backend::{ContactEvent, PhysicsBackend, PhysicsError, RaycastHit};
use crate::world::components::{PhysicsBody, Shape};
use crate::world::entity::EntityId;

/// rapier3d world plus the entity ↔ body mapping.
pub struct RapierBackend {
    pipeline: PhysicsPipeline,
    gravity: Vector<Real>,
    integration_params: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    bodies: BTreeMap<EntityId, RigidBodyHandle>,
}

impl RapierBackend {
    /// Empty world with vertical gravity `gravity_y`.
    pub fn new(gravity_y: f32) -> Self {
        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: vector![0.0, gravity_y, 0.0],
            integration_params: IntegrationParameters::default(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            bodies: BTreeMap::new(),
        }
    }

    fn entity_of(&self, collider: ColliderHandle) -> Option<EntityId> {
        self.collider_set.get(collider).map(|c| decode_entity(c.user_data))
    }

    fn build_collider(entity: EntityId, body: &PhysicsBody) -> Result<Collider, PhysicsError> {
        let builder = match body.shape {
            Shape::Box { half_extents } => {
                if half_extents.x <= 0.0 || half_extents.y <= 0.0 || half_extents.z <= 0.0 {
                    return Err(PhysicsError::InvalidShape(entity, "box extents must be positive".into()));
                }
                ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            }
            Shape::Sphere { radius } => {
                if radius <= 0.0 {
                    return Err(PhysicsError::InvalidShape(entity, "sphere radius must be positive".into()));
                }
                ColliderBuilder::ball(radius)
            }
            Shape::Capsule { half_height, radius } => {
                if half_height < 0.0 || radius <= 0.0 {
                    return Err(PhysicsError::InvalidShape(entity, "capsule dimensions must be positive".into()));
                }
                ColliderBuilder::capsule_y(half_height, radius)
            }
        };

        let groups = InteractionGroups::new(
            Group::from_bits_truncate(body.collision_group),
            Group::from_bits_truncate(body.collision_mask),
        );

        let mut builder = builder
            .friction(body.friction)
            .restitution(body.restitution)
            .collision_groups(groups)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .active_collision_types(ActiveCollisionTypes::all())
            .user_data(encode_entity(entity));
        if body.mass > 0.0 {
            builder = builder.mass(body.mass);
        }
        Ok(builder.build())
    }

    fn contact_details(&self, h1: ColliderHandle, h2: ColliderHandle) -> (Vec3, Vec3, f32) {
        let Some(pair) = self.narrow_phase.contact_pair(h1, h2) else {
            return (Vec3::ZERO, Vec3::ZERO, 0.0);
        };
        let Some((manifold, contact)) = pair.find_deepest_contact() else {
            return (Vec3::ZERO, Vec3::ZERO, 0.0);
        };
        let Some(collider1) = self.collider_set.get(pair.collider1) else {
            return (Vec3::ZERO, Vec3::ZERO, 0.0);
        };

        let world_point = collider1.position() * contact.local_p1;
        let normal = manifold.data.normal;
        (
            Vec3::new(world_point.x, world_point.y, world_point.z),
            Vec3::new(normal.x, normal.y, normal.z),
            contact.data.impulse,
        )
    }
}

impl PhysicsBackend for RapierBackend {
    fn step_world(&mut self, dt: f32) -> Vec<ContactEvent> {
        self.integration_params.dt = dt;

        let (collision_send, collision_recv) = rapier3d::crossbeam::channel::unbounded::<CollisionEvent>();
        let (force_send, _force_recv) = rapier3d::crossbeam::channel::unbounded::<ContactForceEvent>();
        let event_handler = ChannelEventCollector::new(collision_send, force_send);

        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &event_handler,
        );

        let mut contacts = Vec::new();
        while let Ok(event) = collision_recv.try_recv() {
            if let CollisionEvent::Started(h1, h2, _flags) = event {
                let (Some(e1), Some(e2)) = (self.entity_of(h1), self.entity_of(h2)) else {
                    continue;
                };
                let (point, normal, impulse) = self.contact_details(h1, h2);
                let (a, b, normal) = if e1 <= e2 { (e1, e2, normal) } else { (e2, e1, -normal) };
                contacts.push(ContactEvent { a, b, point, normal, impulse });
            }
        }

        // Channel delivery order is not stable across runs
        contacts.sort_by_key(|c| (c.a, c.b));
        contacts
    }

    fn add_body(&mut self, entity: EntityId, body: &PhysicsBody, position: Vec3) -> Result<(), PhysicsError> {
        if self.bodies.contains_key(&entity) {
            return Err(PhysicsError::DuplicateBody(entity));
        }
        if !position.is_finite() {
            return Err(PhysicsError::NonFiniteTransform(entity));
        }

        let collider = Self::build_collider(entity, body)?;
        let translation = vector![position.x, position.y, position.z];

        let rb = if body.is_immovable() {
            RigidBodyBuilder::fixed().translation(translation).build()
        } else if body.is_kinematic {
            RigidBodyBuilder::kinematic_position_based().translation(translation).build()
        } else {
            RigidBodyBuilder::dynamic()
                .translation(translation)
                .linear_damping(body.linear_damping)
                .angular_damping(body.angular_damping)
                .build()
        };

        let handle = self.rigid_body_set.insert(rb);
        self.collider_set.insert_with_parent(collider, handle, &mut self.rigid_body_set);
        self.bodies.insert(entity, handle);

        debug!(entity = ?entity, "Added physics body");
        Ok(())
    }

    fn remove_body(&mut self, entity: EntityId) -> Result<(), PhysicsError> {
        let handle = self.bodies.remove(&entity).ok_or(PhysicsError::MissingBody(entity))?;
        self.rigid_body_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
        debug!(entity = ?entity, "Removed physics body");
        Ok(())
    }

    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        exclude: &[EntityId],
    ) -> Option<RaycastHit> {
        let dir = direction.normalize();
        if dir == Vec3::ZERO || !origin.is_finite() || max_distance <= 0.0 {
            return None;
        }

        let ray = Ray::new(point![origin.x, origin.y, origin.z], vector![dir.x, dir.y, dir.z]);
        let skip = |_handle: ColliderHandle, collider: &Collider| {
            !exclude.contains(&decode_entity(collider.user_data))
        };
        let filter = QueryFilter::default().predicate(&skip);

        let (handle, intersection) = self.query_pipeline.cast_ray_and_get_normal(
            &self.rigid_body_set,
            &self.collider_set,
            &ray,
            max_distance,
            true,
            filter,
        )?;

        let entity = self.entity_of(handle)?;
        let point = ray.point_at(intersection.time_of_impact);
        Some(RaycastHit {
            entity,
            point: Vec3::new(point.x, point.y, point.z),
            normal: Vec3::new(intersection.normal.x, intersection.normal.y, intersection.normal.z),
            distance: intersection.time_of_impact,
        })
    }

    fn get_transform(&self, entity: EntityId) -> Option<Vec3> {
        let handle = self.bodies.get(&entity)?;
        let rb = self.rigid_body_set.get(*handle)?;
        let t = rb.translation();
        Some(Vec3::new(t.x, t.y, t.z))
    }

    fn set_transform(&mut self, entity: EntityId, position: Vec3) -> Result<(), PhysicsError> {
        if !position.is_finite() {
            return Err(PhysicsError::NonFiniteTransform(entity));
        }
        let handle = *self.bodies.get(&entity).ok_or(PhysicsError::MissingBody(entity))?;
        let Some(rb) = self.rigid_body_set.get_mut(handle) else {
            warn!(entity = ?entity, "Body handle without rapier body");
            return Err(PhysicsError::MissingBody(entity));
        };

        let translation = vector![position.x, position.y, position.z];
        rb.set_translation(translation, true);
        if rb.is_kinematic() {
            rb.set_next_kinematic_translation(translation);
        }
        Ok(())
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }
}

fn encode_entity(entity: EntityId) -> u128 {
    ((entity.index as u128) << 32) | entity.generation as u128
}

fn decode_entity(data: u128) -> EntityId {
    EntityId::new((data >> 32) as u32, data as u32)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn floor() -> PhysicsBody {
        PhysicsBody::fixed(Shape::Box { half_extents: Vec3::new(50.0, 0.5, 50.0) })
    }

    #[test]
    fn test_entity_user_data_roundtrip() {
        let id = EntityId::new(42, 7);
        assert_eq!(decode_entity(encode_entity(id)), id);
    }

    #[test]
    fn test_add_and_remove_body() {
        let mut backend = RapierBackend::new(-9.81);
        let id = EntityId::new(0, 0);

        backend.add_body(id, &floor(), Vec3::new(0.0, -0.5, 0.0)).unwrap();
        assert_eq!(backend.body_count(), 1);
        assert_eq!(
            backend.add_body(id, &floor(), Vec3::ZERO),
            Err(PhysicsError::DuplicateBody(id))
        );

        backend.remove_body(id).unwrap();
        assert_eq!(backend.body_count(), 0);
        assert_eq!(backend.remove_body(id), Err(PhysicsError::MissingBody(id)));
    }

    #[test]
    fn test_invalid_shape_rejected() {
        let mut backend = RapierBackend::new(-9.81);
        let body = PhysicsBody::fixed(Shape::Sphere { radius: 0.0 });
        let result = backend.add_body(EntityId::new(0, 0), &body, Vec3::ZERO);
        assert!(matches!(result, Err(PhysicsError::InvalidShape(..))));
    }

    #[test]
    fn test_raycast_hits_floor() {
        let mut backend = RapierBackend::new(-9.81);
        let id = EntityId::new(3, 1);
        backend.add_body(id, &floor(), Vec3::new(0.0, -0.5, 0.0)).unwrap();
        backend.step_world(1.0 / 60.0);

        let hit = backend.raycast(Vec3::new(0.0, 5.0, 0.0), Vec3::DOWN, 20.0, &[]).unwrap();
        assert_eq!(hit.entity, id);
        assert!((hit.point.y - 0.0).abs() < 1e-3);
        assert!((hit.distance - 5.0).abs() < 1e-3);
        assert!(hit.normal.y > 0.9);

        assert!(backend.raycast(Vec3::new(0.0, 5.0, 0.0), Vec3::DOWN, 20.0, &[id]).is_none());
        assert!(backend.raycast(Vec3::new(0.0, 5.0, 0.0), Vec3::UP, 20.0, &[]).is_none());
    }

    #[test]
    fn test_kinematic_set_transform() {
        let mut backend = RapierBackend::new(-9.81);
        let id = EntityId::new(1, 0);
        backend.add_body(id, &PhysicsBody::player(1.2, 0.5, 80.0), Vec3::new(0.0, 1.7, 0.0)).unwrap();

        backend.set_transform(id, Vec3::new(3.0, 1.7, 4.0)).unwrap();
        backend.step_world(1.0 / 60.0);

        let pos = backend.get_transform(id).unwrap();
        assert!((pos.x - 3.0).abs() < 1e-4);
        assert!((pos.z - 4.0).abs() < 1e-4);
        assert_eq!(
            backend.set_transform(id, Vec3::new(f32::NAN, 0.0, 0.0)),
            Err(PhysicsError::NonFiniteTransform(id))
        );
    }

    #[test]
    fn test_dynamic_body_falls_and_touches_floor() {
        let mut backend = RapierBackend::new(-9.81);
        let ground = EntityId::new(0, 0);
        let crate_id = EntityId::new(1, 0);
        backend.add_body(ground, &floor(), Vec3::new(0.0, -0.5, 0.0)).unwrap();

        let mut prop = PhysicsBody::fixed(Shape::Sphere { radius: 0.5 });
        prop.is_static = false;
        prop.mass = 10.0;
        backend.add_body(crate_id, &prop, Vec3::new(0.0, 2.0, 0.0)).unwrap();

        let mut contacts = Vec::new();
        for _ in 0..180 {
            contacts.extend(backend.step_world(1.0 / 60.0));
        }

        let pos = backend.get_transform(crate_id).unwrap();
        assert!(pos.y < 2.0);
        assert!(contacts.iter().any(|c| c.a == ground && c.b == crate_id));
    }
}
