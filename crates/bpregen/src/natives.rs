//! Native class set
//!
//! Every project starts from the same small hierarchy: `Object` at the root,
//! `Actor` for placeable things, and two component classes for default
//! subobjects.

use blueprint_runtime::{ACTOR_CLASS, ObjectModel, ObjectResult, ObjectWorld, PROP_CAN_BE_DAMAGED, PROP_CAN_EVER_TICK};
use blueprint_types::{ClassDef, ClassFlags, FunctionDef, FunctionParam, PinType, PropertyDef};

pub const OBJECT_CLASS: &str = "Object";
pub const ACTOR_COMPONENT_CLASS: &str = "ActorComponent";
pub const SCENE_COMPONENT_CLASS: &str = "SceneComponent";

/// Build an object world holding the native classes and their default objects
pub fn native_world() -> ObjectResult<ObjectWorld> {
    let mut world = ObjectWorld::new();

    let object = world.register_class(ClassDef::new(OBJECT_CLASS).with_flags(ClassFlags::NATIVE))?;

    let actor = world.register_class(
        ClassDef::new(ACTOR_CLASS)
            .with_super(object)
            .with_flags(ClassFlags::NATIVE)
            .with_property(PropertyDef::new(PROP_CAN_EVER_TICK, PinType::Boolean))
            .with_property(PropertyDef::new(PROP_CAN_BE_DAMAGED, PinType::Boolean))
            .with_function(FunctionDef::event("ReceiveBeginPlay"))
            .with_function(
                FunctionDef::event("ReceiveTick").with_param(FunctionParam::new("DeltaSeconds", PinType::Real)),
            )
            .with_function(FunctionDef::new("Destroy"))
            .with_function(
                FunctionDef::new("SetActorHiddenInGame").with_param(FunctionParam::new("Hidden", PinType::Boolean)),
            ),
    )?;
    if let Some(cdo) = world.default_object(actor) {
        world.set_property(cdo, PROP_CAN_EVER_TICK, false)?;
        world.set_property(cdo, PROP_CAN_BE_DAMAGED, true)?;
    }

    let component = world.register_class(
        ClassDef::new(ACTOR_COMPONENT_CLASS)
            .with_super(object)
            .with_flags(ClassFlags::NATIVE)
            .with_function(FunctionDef::new("Activate")),
    )?;

    let scene = world.register_class(
        ClassDef::new(SCENE_COMPONENT_CLASS)
            .with_super(component)
            .with_flags(ClassFlags::NATIVE)
            .with_property(PropertyDef::new("Visible", PinType::Boolean))
            .with_function(
                FunctionDef::new("SetVisibility").with_param(FunctionParam::new("NewVisibility", PinType::Boolean)),
            ),
    )?;
    if let Some(cdo) = world.default_object(scene) {
        world.set_property(cdo, "Visible", true)?;
    }

    tracing::debug!(classes = world.classes().len(), "registered native classes");
    Ok(world)
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueprint_types::Value;

    #[test]
    fn test_native_hierarchy() {
        let world = native_world().unwrap();
        let classes = world.classes();
        let object = classes.find(OBJECT_CLASS).unwrap();
        let actor = classes.find(ACTOR_CLASS).unwrap();
        let scene = classes.find(SCENE_COMPONENT_CLASS).unwrap();

        assert!(classes.is_child_of(actor, object));
        assert!(classes.is_child_of(scene, object));
        assert!(!classes.is_child_of(scene, actor));
        assert!(classes.find_function(actor, "ReceiveTick").is_some());
    }

    #[test]
    fn test_native_defaults() {
        let world = native_world().unwrap();
        let actor = world.classes().find(ACTOR_CLASS).unwrap();
        let cdo = world.default_object(actor).unwrap();
        assert_eq!(world.property(cdo, PROP_CAN_BE_DAMAGED), Some(&Value::Bool(true)));
        assert_eq!(world.property(cdo, PROP_CAN_EVER_TICK), Some(&Value::Bool(false)));
    }
}
