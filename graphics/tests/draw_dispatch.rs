//! Command-stream tests for geometry composition and draw dispatch,
//! run against the recording backend.

mod common;

use std::sync::Arc;

use rstest::rstest;

use glint_graphics::backend::dummy::Command;
use glint_graphics::{
    Context, DrawMode, DrawRange, IndexElementType, Indices, Program, ProgramDescriptor,
    UniformValue, VertexArray, VertexArrayDescriptor,
};

const VS: &str = r#"
    in vec3 a_position;
    uniform mat4 u_mvp;
    void main() { gl_Position = u_mvp * vec4(a_position, 1.0); }
"#;

const VS_INSTANCED: &str = r#"
    in vec3 a_position;
    in mat4 a_offset;
    void main() { gl_Position = a_offset * vec4(a_position, 1.0); }
"#;

const FS: &str = "void main() {}";

/// Two triangles, six vertices.
fn positions() -> Vec<f32> {
    vec![
        0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0,
    ]
}

fn use_program(ctx: &mut Context, vertex_source: &str) -> Program {
    let mut program = Program::new(ProgramDescriptor::new(vertex_source, FS));
    program.use_program(ctx).unwrap();
    program
}

fn pointer_count(ctx: &Context) -> usize {
    ctx.dummy_backend()
        .unwrap()
        .commands()
        .iter()
        .filter(|c| matches!(c, Command::VertexAttributePointer { .. }))
        .count()
}

#[rstest]
#[case::arrays(false, false, Command::DrawArrays {
    mode: DrawMode::Triangles,
    first: 0,
    count: 6,
})]
#[case::indexed(true, false, Command::DrawElements {
    mode: DrawMode::Triangles,
    count: 6,
    element_type: IndexElementType::U8,
    byte_offset: 0,
})]
#[case::instanced(false, true, Command::DrawArraysInstanced {
    mode: DrawMode::Triangles,
    first: 0,
    count: 6,
    instances: 2,
})]
#[case::instanced_indexed(true, true, Command::DrawElementsInstanced {
    mode: DrawMode::Triangles,
    count: 6,
    element_type: IndexElementType::U8,
    byte_offset: 0,
    instances: 2,
})]
fn strategy_follows_composition(
    #[case] indexed: bool,
    #[case] instanced: bool,
    #[case] expected: Command,
) {
    common::init_logging();
    let mut ctx = Context::dummy();
    let _program = use_program(&mut ctx, if instanced { VS_INSTANCED } else { VS });

    let mut descriptor = VertexArrayDescriptor::new().with_position(positions());
    if indexed {
        descriptor = descriptor.with_indices(Indices::Auto(vec![0, 1, 2, 3, 4, 5]));
    }
    if instanced {
        descriptor = descriptor.with_instance_transforms(vec![0.0; 32]); // two mat4s
    }
    let mut va = VertexArray::new(descriptor);
    va.draw(&mut ctx).unwrap();

    let backend = ctx.dummy_backend().unwrap();
    assert_eq!(backend.draw_call_count(), 1);
    let draw = backend.commands().iter().find(|c| c.is_draw()).unwrap();
    assert_eq!(*draw, expected);
}

#[rstest]
#[case::empty_positions(VertexArrayDescriptor::new().with_position(Vec::<f32>::new()))]
#[case::empty_indices(
    VertexArrayDescriptor::new()
        .with_position(vec![0.0; 18])
        .with_indices(Indices::Auto(Vec::new()))
)]
#[case::no_instances(
    VertexArrayDescriptor::new()
        .with_position(vec![0.0; 18])
        .with_instance_transforms(Vec::<f32>::new())
)]
fn zero_counts_issue_nothing(#[case] descriptor: VertexArrayDescriptor) {
    common::init_logging();
    let mut ctx = Context::dummy();
    let _program = use_program(&mut ctx, VS_INSTANCED);
    let mut va = VertexArray::new(descriptor);
    va.draw(&mut ctx).unwrap();
    assert_eq!(ctx.dummy_backend().unwrap().draw_call_count(), 0);
}

#[rstest]
#[case::instanced(false)]
#[case::instanced_indexed(true)]
fn instanced_draws_ignore_range_lists(#[case] indexed: bool) {
    common::init_logging();
    let mut ctx = Context::dummy();
    let _program = use_program(&mut ctx, VS_INSTANCED);
    let mut descriptor = VertexArrayDescriptor::new()
        .with_position(positions())
        .with_instance_transforms(vec![0.0; 32])
        .with_ranges(vec![DrawRange::new(0, 3), DrawRange::new(3, 3)]);
    if indexed {
        descriptor = descriptor.with_indices(Indices::Auto(vec![0, 1, 2, 3, 4, 5]));
    }
    let mut va = VertexArray::new(descriptor);
    va.draw(&mut ctx).unwrap();

    // One instanced call over the whole composition, not one per range.
    let backend = ctx.dummy_backend().unwrap();
    assert_eq!(backend.draw_call_count(), 1);
    let draw = backend.commands().iter().find(|c| c.is_draw()).unwrap();
    assert!(matches!(
        draw,
        Command::DrawArraysInstanced { instances: 2, .. }
            | Command::DrawElementsInstanced { instances: 2, .. }
    ));
}

#[test]
fn resources_stay_bound_to_their_first_context() {
    common::init_logging();
    let mut ctx_a = Context::dummy();
    let mut ctx_b = Context::dummy();
    let mut va = VertexArray::new(VertexArrayDescriptor::new().with_position(positions()));
    va.bind(&mut ctx_a).unwrap();
    assert!(matches!(
        va.bind(&mut ctx_b),
        Err(glint_graphics::GraphicsError::ContextMismatch(_))
    ));

    let mut program = Program::new(ProgramDescriptor::new(VS, FS));
    program.use_program(&mut ctx_a).unwrap();
    assert!(matches!(
        program.set_source(&mut ctx_b, VS, FS),
        Err(glint_graphics::GraphicsError::ContextMismatch(_))
    ));
}

#[test]
fn ranges_split_array_draws() {
    common::init_logging();
    let mut ctx = Context::dummy();
    let _program = use_program(&mut ctx, VS);
    let mut va = VertexArray::new(
        VertexArrayDescriptor::new()
            .with_position(positions())
            .with_ranges(vec![
                DrawRange::new(0, 3),
                DrawRange::new(3, 0), // skipped
                DrawRange::new(3, 3),
            ]),
    );
    va.draw(&mut ctx).unwrap();

    let draws: Vec<Command> = ctx
        .dummy_backend()
        .unwrap()
        .commands()
        .iter()
        .filter(|c| c.is_draw())
        .cloned()
        .collect();
    assert_eq!(
        draws,
        vec![
            Command::DrawArrays {
                mode: DrawMode::Triangles,
                first: 0,
                count: 3,
            },
            Command::DrawArrays {
                mode: DrawMode::Triangles,
                first: 3,
                count: 3,
            },
        ]
    );
}

#[test]
fn indexed_range_offsets_scale_by_element_size() {
    common::init_logging();
    let mut ctx = Context::dummy();
    let _program = use_program(&mut ctx, VS);
    let mut va = VertexArray::new(
        VertexArrayDescriptor::new()
            .with_position(positions())
            .with_indices(Indices::U16(vec![0, 1, 2, 3, 4, 5]))
            .with_ranges(vec![DrawRange::new(0, 3), DrawRange::new(3, 3)]),
    );
    va.draw(&mut ctx).unwrap();

    let offsets: Vec<u32> = ctx
        .dummy_backend()
        .unwrap()
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::DrawElements { byte_offset, .. } => Some(*byte_offset),
            _ => None,
        })
        .collect();
    assert_eq!(offsets, vec![0, 6]);
}

#[test]
fn explicit_offset_and_count_override_defaults() {
    common::init_logging();
    let mut ctx = Context::dummy();
    let _program = use_program(&mut ctx, VS);
    let mut va = VertexArray::new(VertexArrayDescriptor::new().with_position(positions()));
    va.draw_range(&mut ctx, 3, Some(3)).unwrap();
    let backend = ctx.dummy_backend().unwrap();
    let draw = backend.commands().iter().find(|c| c.is_draw()).unwrap();
    assert_eq!(
        *draw,
        Command::DrawArrays {
            mode: DrawMode::Triangles,
            first: 3,
            count: 3,
        }
    );
}

#[test]
fn attribute_pointers_rebind_only_on_program_change() {
    common::init_logging();
    let mut ctx = Context::dummy();
    let mut program_a = Program::new(ProgramDescriptor::new(VS, FS));
    let mut program_b = Program::new(ProgramDescriptor::new(VS, FS));
    let mut va = VertexArray::new(VertexArrayDescriptor::new().with_position(positions()));

    program_a.use_program(&mut ctx).unwrap();
    va.draw(&mut ctx).unwrap();
    va.draw(&mut ctx).unwrap();
    assert_eq!(pointer_count(&ctx), 1);

    program_b.use_program(&mut ctx).unwrap();
    va.draw(&mut ctx).unwrap();
    va.draw(&mut ctx).unwrap();
    assert_eq!(pointer_count(&ctx), 2);

    // A relink of the active program bumps its generation and forces
    // a rebind on the next draw.
    program_b.set_source(&mut ctx, VS, FS).unwrap();
    va.draw(&mut ctx).unwrap();
    assert_eq!(pointer_count(&ctx), 3);
}

#[test]
fn instance_matrix_unfolds_into_vec4_slots() {
    common::init_logging();
    let mut ctx = Context::dummy();
    let _program = use_program(&mut ctx, VS_INSTANCED);
    let mut va = VertexArray::new(
        VertexArrayDescriptor::new()
            .with_position(positions())
            .with_instance_transforms(vec![0.0; 32]),
    );
    va.draw(&mut ctx).unwrap();

    // a_position sits at location 0; the mat4 occupies locations 1-4.
    let slots: Vec<(u32, u32, u32, u32)> = ctx
        .dummy_backend()
        .unwrap()
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::VertexAttributePointer {
                location,
                size,
                stride,
                offset,
                ..
            } if *location >= 1 => Some((*location, *size, *stride, *offset)),
            _ => None,
        })
        .collect();
    assert_eq!(
        slots,
        vec![
            (1, 4, 64, 0),
            (2, 4, 64, 16),
            (3, 4, 64, 32),
            (4, 4, 64, 48),
        ]
    );

    let divisors: Vec<u32> = ctx
        .dummy_backend()
        .unwrap()
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::VertexAttributeDivisor {
                location,
                divisor: 1,
            } => Some(*location),
            _ => None,
        })
        .collect();
    assert_eq!(divisors, vec![1, 2, 3, 4]);
}

#[test]
fn shared_allocations_upload_once() {
    common::init_logging();
    let mut ctx = Context::dummy();
    let _program = use_program(&mut ctx, VS);
    let data: Arc<[f32]> = Arc::from(positions());
    let mut va = VertexArray::new(
        VertexArrayDescriptor::new()
            .with_position(data.clone())
            .with_buffer("normal", data),
    );
    va.draw(&mut ctx).unwrap();

    let backend = ctx.dummy_backend().unwrap();
    let creates = backend
        .commands()
        .iter()
        .filter(|c| matches!(c, Command::CreateBuffer(_)))
        .count();
    let uploads = backend
        .commands()
        .iter()
        .filter(|c| matches!(c, Command::BufferData { .. }))
        .count();
    assert_eq!(creates, 1);
    assert_eq!(uploads, 1);
    assert_eq!(ctx.stats().live_buffers(), 1);

    // The shared handle is deleted exactly once.
    va.dispose(&mut ctx);
    assert_eq!(ctx.stats().live_buffers(), 0);
}

#[test]
fn buffer_updates_reuse_device_objects() {
    common::init_logging();
    let mut ctx = Context::dummy();
    let _program = use_program(&mut ctx, VS);
    let mut va = VertexArray::new(VertexArrayDescriptor::new().with_position(positions()));
    va.draw(&mut ctx).unwrap();
    ctx.dummy_backend_mut().unwrap().clear_commands();

    va.set_position(&mut ctx, vec![0.0; 9]).unwrap();
    let backend = ctx.dummy_backend().unwrap();
    assert!(backend
        .commands()
        .iter()
        .any(|c| matches!(c, Command::BufferData { byte_len: 36, .. })));
    assert!(!backend
        .commands()
        .iter()
        .any(|c| matches!(c, Command::CreateBuffer(_))));

    // A previously unseen name allocates a fresh buffer.
    va.set_buffer_data(&mut ctx, "color", vec![0.0; 9]).unwrap();
    assert_eq!(ctx.stats().live_buffers(), 2);
}

#[test]
fn feedback_draw_is_bracketed() {
    common::init_logging();
    let mut ctx = Context::dummy();
    let _program = use_program(&mut ctx, VS);
    let mut va = VertexArray::new(VertexArrayDescriptor::new().with_position(positions()));
    va.bind(&mut ctx).unwrap();
    ctx.dummy_backend_mut().unwrap().clear_commands();

    va.bind_feedback(&mut ctx).unwrap();
    va.draw_feedback(&mut ctx, 0, None).unwrap();

    let commands = ctx.dummy_backend().unwrap().commands();
    assert!(matches!(
        commands,
        [
            Command::BindFeedbackBuffer {
                index: 0,
                buffer: Some(_),
            },
            Command::SetRasterizerDiscard(true),
            Command::BeginTransformFeedback(DrawMode::Triangles),
            Command::DrawArrays { count: 6, .. },
            Command::EndTransformFeedback,
            Command::SetRasterizerDiscard(false),
        ]
    ));
}

#[test]
fn uniforms_reach_the_backend_with_their_location() {
    common::init_logging();
    let mut ctx = Context::dummy();
    let mut program = Program::new(ProgramDescriptor::new(VS, FS));
    program.use_program(&mut ctx).unwrap();
    let location = program.uniform("u_mvp").unwrap().location;

    program.bind_uniform(&mut ctx, "u_mvp", &UniformValue::Mat4([1.0; 16]));
    let backend = ctx.dummy_backend().unwrap();
    assert!(backend.commands().iter().any(|c| matches!(
        c,
        Command::SetUniform { location: l, value: UniformValue::Mat4(_) } if *l == location
    )));
}
