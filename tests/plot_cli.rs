use assert_cmd::Command;
use assert_fs::prelude::*;
use poasta_tools::io::debug::{DebugOutputMessage, DebugOutputWriter};
use predicates::prelude::*;
use std::path::Path;

fn plot_cmd() -> Command {
    Command::cargo_bin("poasta_plot").unwrap()
}

fn write_debug_dir(dir: &Path) {
    let graph = std::fs::read_to_string("tests/data/poa_small.dot").unwrap();
    let writer = DebugOutputWriter::init(dir);
    for name in ["q1", "q2"] {
        writer.log(DebugOutputMessage::NewSequence {
            seq_name: name.to_string(),
            sequence: "ACGTAC".to_string(),
            max_rank: 10,
        });
        writer.log(DebugOutputMessage::IntermediateGraph { graph_dot: graph.clone() });
        writer.log(DebugOutputMessage::AstarData {
            visited_tsv: "node_id\toffset\tmatrix\tscore\n0\t0\tStart\t0\n2\t1\tMatch\t0\n".to_string(),
        });
        writer.log(DebugOutputMessage::AstarData {
            visited_tsv: "3\t2\tMatch\t0\n4\t2\tDeletion\t8\n5\t3\tInsertion\t12\n".to_string(),
        });
    }
    writer.log(DebugOutputMessage::Terminate);
    writer.join().unwrap();
}

#[test]
fn plots_every_sequence() {
    let input = assert_fs::TempDir::new().unwrap();
    let output = assert_fs::TempDir::new().unwrap();
    write_debug_dir(input.path());

    plot_cmd()
        .arg(input.path())
        .args(["-o", output.path().to_str().unwrap(), "--animate", "-t", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("q1.matrix.png"))
        .stdout(predicate::str::contains("q2.animation.gif"));

    output.child("q1.matrix.png").assert(predicate::path::is_file());
    output.child("q1.animation.gif").assert(predicate::path::is_file());
    output.child("q2.matrix.png").assert(predicate::path::is_file());
    output.child("q1.iter0.png").assert(predicate::path::missing());
}

#[test]
fn plots_selected_sequence_per_iteration() {
    let input = assert_fs::TempDir::new().unwrap();
    let output = assert_fs::TempDir::new().unwrap();
    write_debug_dir(input.path());

    plot_cmd()
        .arg(input.path())
        .args(["-s", "q2", "--each-iteration", "--colormap", "magma"])
        .args(["-o", output.path().to_str().unwrap()])
        .assert()
        .success();

    output.child("q2.iter0.png").assert(predicate::path::is_file());
    output.child("q2.iter1.png").assert(predicate::path::is_file());
    output.child("q1.matrix.png").assert(predicate::path::missing());
}

#[test]
fn graph_image_without_graphviz_still_plots() {
    let input = assert_fs::TempDir::new().unwrap();
    let output = assert_fs::TempDir::new().unwrap();
    write_debug_dir(input.path());

    plot_cmd()
        .env("POASTA_DOT", input.child("no-such-dot").path())
        .env_remove("RUST_LOG")
        .arg(input.path())
        .args(["-s", "q1", "--graph-image", "-o", output.path().to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("graph image skipped"))
        .stderr(predicate::str::contains("cannot run graphviz"));

    output.child("q1.matrix.png").assert(predicate::path::is_file());
    output.child("q1.graph.svg").assert(predicate::path::missing());
}

#[test]
fn unknown_sequence_fails() {
    let input = assert_fs::TempDir::new().unwrap();
    write_debug_dir(input.path());
    plot_cmd()
        .arg(input.path())
        .args(["-s", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("'nope' not found"));
}

#[test]
fn missing_input_fails() {
    let temp = assert_fs::TempDir::new().unwrap();
    plot_cmd()
        .arg(temp.child("does_not_exist").path())
        .assert()
        .failure();
}

#[test]
fn bad_colormap_is_rejected() {
    let temp = assert_fs::TempDir::new().unwrap();
    plot_cmd()
        .arg(temp.path())
        .args(["--colormap", "rainbow"])
        .assert()
        .failure();
}
