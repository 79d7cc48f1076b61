//! Refine a square terrain patch around a moving point and upload the
//! heap each frame, the way a renderer would drive the tree.

use glam::Vec2;
use leb_cbt::{
    executor, HeapUploader, MemoryDevice, Mode, Stage, Subdivision, SubdivisionConfig, TreeConfig,
};

fn main() -> anyhow::Result<()> {
    let config = SubdivisionConfig::default()
        .with_tree(TreeConfig::new(14, 1)?)
        .with_mode(Mode::Square);
    config.validate()?;

    let mut tree = executor::from_config(&config)?;
    let mut subdivision = Subdivision::from_config(&config);

    let byte_size = tree.read_heap().len();
    let mut device = MemoryDevice::new(byte_size);
    let mut uploader = HeapUploader::new(byte_size, Stage::VertexShader);

    for frame in 0..48u32 {
        // circle around the patch centre
        let angle = frame as f32 / 48.0 * std::f32::consts::TAU;
        subdivision.set_target(Vec2::new(0.5, 0.5) + 0.3 * Vec2::new(angle.cos(), angle.sin()));

        uploader.begin_frame();
        let kind = subdivision.next_pass();
        let report = subdivision.step(tree.as_mut());
        uploader.upload(tree.read_heap(), &mut device)?;
        uploader.begin_read(Stage::VertexShader)?;

        println!(
            "frame {frame:>2}: {kind:?} mutations={:>5} leaves={:>6}",
            report.mutations,
            report.node_count
        );
    }

    println!("device heap: {} bytes", device.as_bytes().len());
    Ok(())
}
