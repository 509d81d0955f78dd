//! Built-in starter program.

use playpen_common::Pen;

/// Name given to the starter pen.
pub const TEMPLATE_NAME: &str = "Hello playground";

/// Source of the starter pen.
pub const TEMPLATE_SOURCE: &str = r#";; Edit me! Output printed with env.print shows up in the preview.
(module
  (import "env" "print" (func $print (param i32 i32)))
  (import "env" "log" (func $log (param i32 i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "Hello, playground!")
  (data (i32.const 32) "started")

  (func (export "_start")
    ;; level 1 = info
    (call $log (i32.const 1) (i32.const 32) (i32.const 7))
    (call $print (i32.const 0) (i32.const 18))
  )
)
"#;

/// The starter pen.
pub fn template_pen() -> Pen {
    Pen::new(TEMPLATE_NAME, TEMPLATE_SOURCE)
}
