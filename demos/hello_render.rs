use std::any::Any;
use std::sync::Arc;
use unit_render::document::{InMemoryDocumentRegistry, PlainDocument};
use unit_render::module::module_fn;
use unit_render::render::backends::null::NullBackend;
use unit_render::unit::{Capability, CapabilityId, UnitId, UnitType};
use unit_render::{RenderConfig, RenderManager};

/// Capability that remembers which unit it was built for.
struct Selection {
    unit_id: UnitId,
}

impl Capability for Selection {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Configure the manager through the config builder. Scenes get a 800x600 default size.
    let config = RenderConfig::builder()
        .default_scene_size(800, 600)
        .build()?;

    // The host owns the documents. Here we use the in-memory registry with one spreadsheet.
    let documents = Arc::new(InMemoryDocumentRegistry::new());
    documents.add_unit(Arc::new(PlainDocument::new("sheet-1", UnitType::Sheet)));

    // The NullBackend does not draw anything, but it hands out real engines and scenes.
    let manager = RenderManager::new(Some(config), Box::new(NullBackend::new()), documents.clone());

    // Every spreadsheet unit gets a selection capability.
    let selection = CapabilityId::from_static("selection");
    let registration = manager.register_render_module(
        UnitType::Sheet,
        module_fn(selection.clone(), |unit| {
            Ok(Arc::new(Selection { unit_id: unit.context().unit_id().clone() }) as Arc<dyn Capability>)
        }),
    )?;

    // Async consumers listen on a broadcast receiver, sync consumers subscribe a callback.
    let mut disposed_rx = manager.listen_disposed()?;
    let _created = manager.subscribe_created(|unit| {
        println!("created {} ({}, thumbnail: {})", unit.unit_id(), unit.unit_type(), unit.is_thumbnail());
    })?;

    let sheet = manager.create_render("sheet-1")?;
    manager.create_render("preview-1")?;

    documents.focus_unit(&UnitId::from("sheet-1"));
    if let Some(owner) = manager
        .get_current_type_of_renderer(UnitType::Sheet)
        .and_then(|unit| unit.with_capability(&selection, |s: &Selection| s.unit_id.clone()))
    {
        println!("current sheet selection belongs to {owner}");
    }
    println!("scene key of sheet-1: {}", sheet.scene().key());

    registration.unregister();
    manager.remove_render("preview-1")?;
    println!("disposed {}", disposed_rx.recv().await?);

    manager.dispose()?;
    println!("{} unit(s) left", manager.len());

    Ok(())
}
