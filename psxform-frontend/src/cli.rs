use psxform_config::AppConfig;
use psxform_core::entity::{ColorIndex, Shape, Space};
use psxform_core::view::ViewportId;
use psxform_engine::command::{CommandBus, CommandContext, CommandRequest};
use psxform_engine::markup::{MarkupEvent, MarkupOutcome, ProjectionReport, handle_event};
use psxform_engine::session::EditingSession;
use psxform_io::{JsonFacade, ReportWriter};
use tracing::{info, warn};

use crate::errors::FrontendError;
use crate::loader::{LoadedDemo, SessionSource, load_session};

/// 简易 CLI 演示：加载会话，执行 `drawmarkup` 与标注投影，并打印结果。
pub fn run_demo(config: &AppConfig) -> Result<(), FrontendError> {
    let LoadedDemo {
        mut loaded,
        source,
    } = load_session(config);

    println!("psxform CLI 演示");
    match &source {
        SessionSource::Snapshot(path) => println!("已从快照加载会话：{}", path.display()),
        SessionSource::Demo => println!("使用内置示例会话"),
    }

    let command_bus = CommandBus::new();
    let mut commands: Vec<&str> = command_bus.available_commands().copied().collect();
    commands.sort_unstable();
    println!("支持的命令: {}", commands.join(", "));

    if let Some(&first) = loaded.entities.first() {
        loaded.session.queue_pick(Some(first));
    }
    let mut context = CommandContext {
        session: &mut loaded.session,
        highlight: ColorIndex(config.markup.highlight_color),
    };
    for name in ["psdcs2wcs", "drawmarkup"] {
        let response = command_bus.dispatch(&CommandRequest::new(name), &mut context);
        let message = response.message.unwrap_or_default();
        if response.success {
            println!("{name}: {message}");
        } else {
            warn!(command = name, "CLI 命令执行失败: {message}");
            println!("{name} 失败: {message}");
        }
    }

    let model_count = loaded.session.database().count(Space::Model);
    info!(model_count, "模型空间实体统计");
    println!("模型空间实体：");
    for (id, entity) in loaded.session.database().entities(Space::Model) {
        let points: Vec<String> = entity
            .control_points()
            .iter()
            .map(|p| format!("({:.3}, {:.3}, {:.3})", p.x(), p.y(), p.z()))
            .collect();
        let kind = match &entity.shape {
            Shape::Line(_) => "直线",
            Shape::Polyline(_) => "多段线",
            Shape::Circle(_) => "圆",
            Shape::Text(_) => "文字",
        };
        println!(
            "  - {kind} #{}, Layer={}, 颜色={:?}, 控制点={}",
            id.get(),
            entity.layer,
            entity.color.map(|c| c.0),
            points.join(" -> ")
        );
    }

    let explicit = config.viewer.default_viewport.map(ViewportId::new);
    for (index, markup) in loaded.markups.iter().enumerate() {
        let mode = handle_event(
            &loaded.viewer,
            &MarkupEvent::EditModeChanged(Some(markup.kind)),
        )?;
        if let MarkupOutcome::Unsupported(kind) = mode {
            println!("标注 #{index}: 暂不支持 {} 类型", kind.type_name());
            continue;
        }
        let selected = MarkupEvent::MarkupSelected {
            markup: *markup,
            viewport: explicit,
        };
        match handle_event(&loaded.viewer, &selected) {
            Ok(MarkupOutcome::Projected(report)) => {
                print_report(index, &report);
                write_report(config, index, &report)?;
            }
            Ok(other) => println!("标注 #{index}: {other:?}"),
            Err(err) => {
                warn!(index, error = %err, "标注投影失败");
                println!("标注 #{index} 投影失败: {err}");
            }
        }
    }
    Ok(())
}

fn print_report(index: usize, report: &ProjectionReport) {
    let min = report.bounds.min();
    let max = report.bounds.max();
    println!(
        "标注 #{index}: 视口 {} 模型范围 min=({}, {}) max=({}, {})",
        report.viewport.get(),
        min.x(),
        min.y(),
        max.x(),
        max.y()
    );
}

fn write_report(
    config: &AppConfig,
    index: usize,
    report: &ProjectionReport,
) -> Result<(), FrontendError> {
    let Some(dir) = &config.session.report_dir else {
        return Ok(());
    };
    let path = dir.join(format!("markup-{index}.json"));
    JsonFacade::new().write(report, &path)?;
    info!(path = %path.display(), "投影结果已写出");
    Ok(())
}
