//! MidIR test programs together with the output they print.
#![allow(dead_code)]

use interpreter::runtime::{INT_TO_STRING, MALLOC, PRINTLN, STRING_CONCAT, STRING_TO_INT, THROW};
use mir::{
    CompilationUnit, Expression as E, Function, GlobalVariable, Operator, Statement as S,
    COMPILED_PROGRAM_MAIN,
};

pub struct TestProgram {
    pub name: &'static str,
    pub unit: CompilationUnit,
    /// The printed output, or the panic message.
    pub expected: Result<String, String>,
}

fn op(operator: Operator, e1: E, e2: E) -> E {
    E::op(operator, e1, e2)
}

fn temp(id: &str) -> E {
    E::temp(id)
}

fn function(name: &str, args: &[&str], body: Vec<S>, has_return: bool) -> Function {
    Function {
        function_name: name.to_string(),
        argument_temps: args.iter().map(|arg| arg.to_string()).collect(),
        main_body_statements: body,
        has_return,
        is_public: false,
    }
}

fn main(mut body: Vec<S>) -> Function {
    body.push(S::ret(None));
    Function {
        is_public: true,
        ..function(COMPILED_PROGRAM_MAIN, &[], body, false)
    }
}

fn print_int(value: E) -> Vec<S> {
    vec![
        S::call(E::name(INT_TO_STRING), vec![value], Some("_printed")),
        S::call(E::name(PRINTLN), vec![temp("_printed")], None),
    ]
}

fn strings(contents: &[&str]) -> Vec<GlobalVariable> {
    contents
        .iter()
        .enumerate()
        .map(|(idx, content)| GlobalVariable {
            name: format!("GLOBAL_STRING_{}", idx),
            content: content.to_string(),
        })
        .collect()
}

fn program(
    name: &'static str,
    global_variables: Vec<GlobalVariable>,
    functions: Vec<Function>,
    expected: Result<&str, &str>,
) -> TestProgram {
    TestProgram {
        name,
        unit: CompilationUnit {
            global_variables,
            functions,
        },
        expected: expected.map(str::to_string).map_err(str::to_string),
    }
}

fn factorial() -> TestProgram {
    let factorial = function(
        "factorial",
        &["n"],
        vec![
            S::cjump_fallthrough(op(Operator::Le, temp("n"), E::constant(1)), "base"),
            S::call(
                E::name("factorial"),
                vec![op(Operator::Sub, temp("n"), E::constant(1))],
                Some("r"),
            ),
            S::ret(Some(op(Operator::Mul, temp("n"), temp("r")))),
            S::label("base"),
            S::ret(Some(E::constant(1))),
        ],
        true,
    );
    let mut body = vec![S::call(
        E::name("factorial"),
        vec![E::constant(10)],
        Some("f"),
    )];
    body.extend(print_int(temp("f")));
    program(
        "factorial",
        vec![],
        vec![main(body), factorial],
        Ok("3628800\n"),
    )
}

fn fib() -> TestProgram {
    let fib = function(
        "fib",
        &["n"],
        vec![
            S::cjump_fallthrough(op(Operator::Lt, temp("n"), E::constant(2)), "small"),
            S::call(
                E::name("fib"),
                vec![op(Operator::Sub, temp("n"), E::constant(1))],
                Some("a"),
            ),
            S::call(
                E::name("fib"),
                vec![op(Operator::Sub, temp("n"), E::constant(2))],
                Some("b"),
            ),
            S::ret(Some(op(Operator::Add, temp("a"), temp("b")))),
            S::label("small"),
            S::ret(Some(temp("n"))),
        ],
        true,
    );
    let mut body = vec![S::call(E::name("fib"), vec![E::constant(15)], Some("f"))];
    body.extend(print_int(temp("f")));
    program("fib", vec![], vec![main(body), fib], Ok("610\n"))
}

fn loop_sum() -> TestProgram {
    let mut body = vec![
        S::move_temp("sum", E::constant(0)),
        S::move_temp("i", E::constant(1)),
        S::label("loop_start"),
        S::cjump_fallthrough(op(Operator::Gt, temp("i"), E::constant(100)), "loop_end"),
        S::move_temp("sum", op(Operator::Add, temp("sum"), temp("i"))),
        S::move_temp("i", op(Operator::Add, temp("i"), E::constant(1))),
        S::jump("loop_start"),
        S::label("loop_end"),
    ];
    body.extend(print_int(temp("sum")));
    program("loop_sum", vec![], vec![main(body)], Ok("5050\n"))
}

fn division() -> TestProgram {
    let mut body = vec![
        S::move_temp("a", E::constant(-7)),
        S::move_temp("b", E::constant(2)),
        S::move_temp("c", E::constant(100)),
        S::move_temp("d", E::constant(7)),
    ];
    body.extend(print_int(op(Operator::Div, temp("a"), temp("b"))));
    body.extend(print_int(op(Operator::Mod, temp("a"), temp("b"))));
    body.extend(print_int(op(Operator::Div, temp("c"), temp("d"))));
    body.extend(print_int(op(Operator::Mod, temp("c"), temp("d"))));
    body.extend(print_int(op(Operator::Mul, temp("c"), E::constant(16))));
    body.extend(print_int(op(
        Operator::Xor,
        op(Operator::And, temp("c"), E::constant(12)),
        op(Operator::Or, temp("d"), E::constant(8)),
    )));
    program(
        "division",
        vec![],
        vec![main(body)],
        Ok("-3\n-1\n14\n2\n1600\n11\n"),
    )
}

fn string_builtins() -> TestProgram {
    let mut body = vec![
        S::call(
            E::name(STRING_CONCAT),
            vec![E::name("GLOBAL_STRING_0"), E::name("GLOBAL_STRING_1")],
            Some("greeting"),
        ),
        S::call(E::name(PRINTLN), vec![temp("greeting")], None),
        S::call(
            E::name(STRING_TO_INT),
            vec![E::name("GLOBAL_STRING_2")],
            Some("number"),
        ),
    ];
    body.extend(print_int(op(Operator::Add, temp("number"), E::constant(1))));
    program(
        "string_builtins",
        strings(&["Hello, ", "World", "123"]),
        vec![main(body)],
        Ok("Hello, World\n124\n"),
    )
}

/// Horner's scheme over eight arguments, two of which are passed on the
/// stack.
fn eight_arguments() -> TestProgram {
    let args = ["a", "b", "c", "d", "e", "f", "g", "h"];
    let horner = args[1..].iter().fold(temp(args[0]), |acc, arg| {
        op(
            Operator::Add,
            op(Operator::Mul, acc, E::constant(2)),
            temp(arg),
        )
    });
    let horner = function("horner", &args, vec![S::ret(Some(horner))], true);
    let mut body = vec![S::call(
        E::name("horner"),
        (1..=8).map(E::constant).collect(),
        Some("r"),
    )];
    body.extend(print_int(temp("r")));
    program(
        "eight_arguments",
        vec![],
        vec![main(body), horner],
        Ok("502\n"),
    )
}

/// A single stack argument, so the caller has to pad the stack.
fn seven_arguments() -> TestProgram {
    let args = ["a", "b", "c", "d", "e", "f", "g"];
    let sum = args
        .iter()
        .enumerate()
        .map(|(idx, arg)| op(Operator::Mul, temp(arg), E::constant(idx as i64 + 1)))
        .fold(E::constant(0), |sum, term| op(Operator::Add, sum, term));
    let weighted = function("weighted", &args, vec![S::ret(Some(sum))], true);
    let mut body = vec![S::call(
        E::name("weighted"),
        (1..=7).map(E::constant).collect(),
        Some("r"),
    )];
    body.extend(print_int(temp("r")));
    program(
        "seven_arguments",
        vec![],
        vec![main(body), weighted],
        Ok("140\n"),
    )
}

/// Twenty values that are all live across a call.
fn high_pressure() -> TestProgram {
    let temps = (0..20).map(|i| format!("t{}", i)).collect::<Vec<_>>();
    let mut body = vec![S::move_temp("seed", E::constant(1))];
    for (i, t) in temps.iter().enumerate() {
        body.push(S::move_temp(
            t.as_str(),
            op(
                Operator::Add,
                op(Operator::Mul, temp("seed"), E::constant(3 * i as i64)),
                temp("seed"),
            ),
        ));
    }
    body.extend(print_int(temp(&temps[0])));
    let sum = temps
        .iter()
        .skip(1)
        .fold(temp(&temps[0]), |sum, t| op(Operator::Add, sum, temp(t)));
    body.extend(print_int(sum));
    program(
        "high_pressure",
        vec![],
        vec![main(body)],
        Ok("1\n590\n"),
    )
}

fn memory() -> TestProgram {
    let element = |index: E| {
        op(
            Operator::Add,
            temp("array"),
            op(Operator::Mul, op(Operator::Add, index, E::constant(1)), E::constant(8)),
        )
    };
    let mut body = vec![
        S::call(E::name(MALLOC), vec![E::constant(48)], Some("array")),
        S::move_mem(temp("array"), E::constant(5)),
        S::move_temp("i", E::constant(0)),
        S::label("fill"),
        S::cjump_fallthrough(
            op(Operator::Ge, temp("i"), E::mem(temp("array"))),
            "filled",
        ),
        S::move_mem(element(temp("i")), op(Operator::Mul, temp("i"), temp("i"))),
        S::move_temp("i", op(Operator::Add, temp("i"), E::constant(1))),
        S::jump("fill"),
        S::label("filled"),
        S::move_temp("sum", E::constant(0)),
        S::move_temp("i", E::constant(0)),
        S::label("sum"),
        S::cjump_fallthrough(op(Operator::Eq, temp("i"), E::constant(5)), "done"),
        S::move_temp("sum", op(Operator::Add, temp("sum"), E::mem(element(temp("i"))))),
        S::move_temp("i", op(Operator::Add, temp("i"), E::constant(1))),
        S::jump("sum"),
        S::label("done"),
    ];
    body.extend(print_int(temp("sum")));
    program("memory", vec![], vec![main(body)], Ok("30\n"))
}

fn function_pointer() -> TestProgram {
    let twice = function(
        "twice",
        &["x"],
        vec![S::ret(Some(op(Operator::Add, temp("x"), temp("x"))))],
        true,
    );
    let mut body = vec![
        S::move_temp("f", E::name("twice")),
        S::call(temp("f"), vec![E::constant(21)], Some("r")),
    ];
    body.extend(print_int(temp("r")));
    program(
        "function_pointer",
        vec![],
        vec![main(body), twice],
        Ok("42\n"),
    )
}

fn division_by_zero() -> TestProgram {
    let mut body = vec![
        S::call(E::name(PRINTLN), vec![E::name("GLOBAL_STRING_0")], None),
        S::move_temp("zero", E::constant(0)),
    ];
    body.extend(print_int(op(Operator::Div, E::constant(10), temp("zero"))));
    program(
        "division_by_zero",
        strings(&["before"]),
        vec![main(body)],
        Err("Division by zero!"),
    )
}

fn throw() -> TestProgram {
    let body = vec![S::call(E::name(THROW), vec![E::name("GLOBAL_STRING_0")], None)];
    program("throw", strings(&["oops"]), vec![main(body)], Err("oops"))
}

fn bad_number() -> TestProgram {
    let body = vec![S::call(
        E::name(STRING_TO_INT),
        vec![E::name("GLOBAL_STRING_0")],
        Some("n"),
    )];
    program(
        "bad_number",
        strings(&["12a"]),
        vec![main(body)],
        Err("Bad string: 12a"),
    )
}

pub fn corpus() -> Vec<TestProgram> {
    vec![
        factorial(),
        fib(),
        loop_sum(),
        division(),
        string_builtins(),
        seven_arguments(),
        eight_arguments(),
        high_pressure(),
        memory(),
        function_pointer(),
        division_by_zero(),
        throw(),
        bad_number(),
    ]
}
