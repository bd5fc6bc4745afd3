//! Scenario-based tests for cirun

#[path = "../helpers.rs"]
mod helpers;

mod dev_push;
mod fail_fast;
mod job_dependencies;
mod matrix_expansion;
mod secrets;
mod step_sequence;
mod trigger_matching;

/// The workflow most scenarios run: one matrix job building a Python package
pub const CI_WORKFLOW: &str = r#"
name: CI
on:
  push:
    branches: [master, dev]
  pull_request:
jobs:
  build-linux:
    runs-on: ubuntu-latest
    strategy:
      max-parallel: 5
      fail-fast: false
      matrix:
        python-version: ['3.8', '3.9', '3.10']
    steps:
      - uses: actions/checkout@v2
      - id: setup
        name: Set up Python ${{ matrix.python-version }}
        run: conda create -n test python=${{ matrix.python-version }}
      - id: install
        run: pip install .
      - id: test
        run: pytest --cov
      - id: upload
        env:
          CODECOV_TOKEN: ${{ secrets.CODECOV_TOKEN }}
        run: codecov -t $CODECOV_TOKEN
"#;

pub const INSTANCES: [&str; 3] = ["build-linux[0]", "build-linux[1]", "build-linux[2]"];
