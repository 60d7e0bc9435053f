//! Example: Load a mesh, bake deformation steps and print what a render would see.
//!
//! Run with: cargo run --example inspect_mesh -- assets/bunny.obj [steps]

use std::env;
use std::path::Path;

use mbrt_core::mesh::DEFAULT_DISPLACEMENT;
use mbrt_core::{load_mesh, GeometryTable, SceneDescription};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("Usage: inspect_mesh <path-to-obj-or-stl> [deformation-steps]");
        println!("\nExamples:");
        println!("  cargo run --example inspect_mesh -- assets/bunny.obj");
        println!("  cargo run --example inspect_mesh -- assets/part.stl 2");
        return;
    }

    let path = Path::new(&args[1]);
    let steps: u32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(0);
    println!("Loading mesh file: {}", path.display());

    let mut meshes = match load_mesh(path, path.parent()) {
        Ok(meshes) => meshes,
        Err(e) => {
            eprintln!("Error loading mesh: {}", e);
            std::process::exit(1);
        }
    };

    for mesh in &mut meshes {
        if !mesh.has_vertex_normals() {
            mesh.compute_vertex_normals();
        }
        if let Err(e) = mesh.deform(steps, DEFAULT_DISPLACEMENT) {
            eprintln!("Error deforming '{}': {}", mesh.name(), e);
            std::process::exit(1);
        }
    }

    println!("\n--- Meshes ---");
    for (i, mesh) in meshes.iter().enumerate() {
        let bounds = mesh.bounds();
        println!(
            "  [{}] {} - {} unique vertices, {} unique triangles, {} steps",
            i,
            mesh.name(),
            mesh.unique_vertex_count(),
            mesh.unique_triangle_count(),
            mesh.step_count()
        );
        println!(
            "       Bounds: ({:.2}, {:.2}, {:.2}) to ({:.2}, {:.2}, {:.2})",
            bounds.x.min, bounds.y.min, bounds.z.min, bounds.x.max, bounds.y.max, bounds.z.max
        );
    }

    let scene = SceneDescription::one_instance_per_mesh(meshes);
    match GeometryTable::build(&scene) {
        Ok(table) => {
            println!("\n--- Descriptors ---");
            for d in table.descriptors() {
                println!(
                    "  instance {} -> geometry {}: {} triangles, {} vertices",
                    d.instance_id, d.geometry_id, d.triangle_count, d.vertex_count
                );
            }
        }
        Err(e) => eprintln!("Error building descriptor table: {}", e),
    }
}
