//! Invocación del binario LKH
//!
//! Genera los ficheros de problema y parámetros en un directorio temporal
//! por llamada, ejecuta el binario con kill-on-timeout y parsea el fichero
//! de tour (índices 1-based, terminador -1). La validez del tour se
//! comprueba; salida inválida es un error, no se repara en silencio.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Parámetros de ejecución dependientes del tamaño del problema.
///
/// Son política de latencia, no parte del contrato externo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LkhParams {
    pub runs: u32,
    pub max_trials: u32,
    pub time_limit_secs: u64,
}

impl LkhParams {
    pub fn for_dimension(n: usize, requested_runs: Option<u32>) -> Self {
        let (default_runs, time_limit_secs, max_trials) = if n <= 5 {
            (3, 5, 500)
        } else if n <= 10 {
            (5, 8, 1000)
        } else if n <= 20 {
            (8, 12, 3000)
        } else if n <= 50 {
            (10, 15, 5000)
        } else {
            (12, 20, 8000)
        };

        Self {
            runs: requested_runs.unwrap_or(default_runs).max(default_runs),
            max_trials,
            time_limit_secs,
        }
    }
}

/// Serializa la matriz al formato de problema de LKH
pub fn problem_file_contents(matrix: &[Vec<i64>]) -> String {
    let n = matrix.len();
    let mut out = String::new();

    out.push_str(&format!("NAME : dynamic_tsp_{}\n", n));
    out.push_str("TYPE : TSP\n");
    out.push_str("COMMENT : Dynamic TSP for delivery\n");
    out.push_str(&format!("DIMENSION : {}\n", n));
    out.push_str("EDGE_WEIGHT_TYPE : EXPLICIT\n");
    out.push_str("EDGE_WEIGHT_FORMAT: FULL_MATRIX\n");
    out.push_str("EDGE_WEIGHT_SECTION\n");
    for row in matrix {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    out.push_str("EOF\n");
    out
}

/// Fichero de parámetros con los ajustes de ejecución rápida
pub fn param_file_contents(
    n: usize,
    problem_file: &Path,
    output_file: &Path,
    params: LkhParams,
    seed: u32,
) -> String {
    let mut out = String::new();

    out.push_str(&format!("PROBLEM_FILE = {}\n", problem_file.display()));
    out.push_str(&format!("OUTPUT_TOUR_FILE = {}\n", output_file.display()));
    out.push_str(&format!("RUNS = {}\n", params.runs.min(5)));
    out.push_str("TRACE_LEVEL = 1\n");
    out.push_str(&format!("TIME_LIMIT = {}\n", params.time_limit_secs));
    out.push_str(&format!("MAX_TRIALS = {}\n", params.max_trials));
    out.push_str(&format!("SEED = {}\n", seed));
    out.push_str("INITIAL_PERIOD = 10\n");
    out.push_str("MAX_CANDIDATES = 5\n");

    if n > 30 {
        out.push_str("CANDIDATE_SET_TYPE = POPMUSIC\n");
        out.push_str("POPMUSIC_SAMPLE_SIZE = 10\n");
        out.push_str("POPMUSIC_SOLUTIONS = 50\n");
        out.push_str("POPMUSIC_MAX_NEIGHBORS = 5\n");
        out.push_str("POPMUSIC_TRIALS = 1\n");
        out.push_str("SUBGRADIENT = YES\n");
        out.push_str("ASCENT_CANDIDATES = 30\n");
    } else if n > 10 {
        out.push_str("CANDIDATE_SET_TYPE = POPMUSIC\n");
        out.push_str("POPMUSIC_SAMPLE_SIZE = 8\n");
        out.push_str("POPMUSIC_SOLUTIONS = 30\n");
        out.push_str("POPMUSIC_MAX_NEIGHBORS = 3\n");
        out.push_str("POPMUSIC_TRIALS = 1\n");
    }

    out
}

/// Parsea el fichero de tour de LKH y devuelve el tour 0-based rotado para
/// empezar en el nodo 0.
pub fn parse_tour_file(contents: &str, n: usize) -> Result<Vec<usize>> {
    let mut tour = Vec::with_capacity(n);
    let mut in_tour_section = false;

    for line in contents.lines() {
        let line = line.trim();
        if line == "TOUR_SECTION" {
            in_tour_section = true;
            continue;
        }
        if !in_tour_section {
            continue;
        }
        if line == "-1" || line == "EOF" {
            break;
        }

        let node_1based: i64 = line
            .parse()
            .with_context(|| format!("invalid node index in tour file: {}", line))?;
        if node_1based < 1 {
            bail!("invalid node index in tour file: {}", node_1based);
        }
        tour.push((node_1based - 1) as usize);
    }

    if !in_tour_section {
        bail!("no TOUR_SECTION in tour file");
    }
    if tour.len() != n {
        bail!("parsed tour has {} nodes, expected {}", tour.len(), n);
    }

    let mut seen = vec![false; n];
    for &node in &tour {
        if node >= n || seen[node] {
            bail!("parsed tour is not a permutation of [0, {})", n);
        }
        seen[node] = true;
    }

    // el contrato externo fija el nodo 0 como inicio del tour
    let zero_pos = tour
        .iter()
        .position(|&node| node == 0)
        .ok_or_else(|| anyhow!("tour does not contain node 0"))?;
    tour.rotate_left(zero_pos);

    Ok(tour)
}

/// Coste reportado por LKH en stdout ("Cost.min = …" o "Cost = …")
pub fn parse_cost_from_stdout(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .find(|line| line.contains("Cost.min =") || line.contains("Cost ="))
        .and_then(|line| line.rsplit('=').next())
        .and_then(|value| value.trim().parse().ok())
}

/// Coste de un tour cerrado sobre la matriz
pub fn tour_cost(matrix: &[Vec<i64>], tour: &[usize]) -> f64 {
    let n = tour.len();
    let mut cost = 0.0;
    for i in 0..n {
        let from = tour[i];
        let to = tour[(i + 1) % n];
        cost += matrix[from][to] as f64;
    }
    cost
}

/// Resuelve un TSP con el binario LKH.
///
/// El subproceso corre en un directorio temporal propio y se mata si excede
/// time_limit + 30 s. stdin/stdout nunca se comparten entre invocaciones
/// concurrentes.
pub async fn solve_tsp_with_lkh(
    executable: &str,
    matrix: &[Vec<i64>],
    requested_runs: Option<u32>,
    seed: u32,
) -> Result<(Vec<usize>, f64)> {
    let n = matrix.len();
    if n == 0 {
        return Ok((vec![], 0.0));
    }
    if n == 1 {
        return Ok((vec![0], 0.0));
    }

    let params = LkhParams::for_dimension(n, requested_runs);

    let tempdir = tempfile::tempdir().context("failed to create temp dir for LKH")?;
    let problem_path = tempdir.path().join("problem.tsp");
    let param_path = tempdir.path().join("params.par");
    let output_path = tempdir.path().join("output.tour");

    let mut problem_file = tokio::fs::File::create(&problem_path).await?;
    problem_file
        .write_all(problem_file_contents(matrix).as_bytes())
        .await?;
    problem_file.flush().await?;

    let mut param_file = tokio::fs::File::create(&param_path).await?;
    param_file
        .write_all(param_file_contents(n, &problem_path, &output_path, params, seed).as_bytes())
        .await?;
    param_file.flush().await?;

    let child = Command::new(executable)
        .arg(&param_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("LKH executable not found at {}", executable))?;

    let watchdog = Duration::from_secs(params.time_limit_secs + 30);
    let output = tokio::time::timeout(watchdog, child.wait_with_output())
        .await
        .map_err(|_| anyhow!("LKH execution timed out after {:?}", watchdog))??;

    if !output.status.success() {
        bail!(
            "LKH exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let tour_contents = tokio::fs::read_to_string(&output_path)
        .await
        .context("LKH output tour file not found")?;
    let tour = parse_tour_file(&tour_contents, n)?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let cost = match parse_cost_from_stdout(&stdout) {
        Some(cost) => cost,
        None => {
            log::warn!("LKH stdout sin línea de coste, recalculando desde la matriz");
            tour_cost(matrix, &tour)
        }
    };

    Ok((tour, cost))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_schedule() {
        assert_eq!(
            LkhParams::for_dimension(4, None),
            LkhParams {
                runs: 3,
                max_trials: 500,
                time_limit_secs: 5
            }
        );
        assert_eq!(LkhParams::for_dimension(15, None).time_limit_secs, 12);
        assert_eq!(LkhParams::for_dimension(40, None).max_trials, 5000);
        assert_eq!(LkhParams::for_dimension(200, None).runs, 12);
        // runs pedidos por el caller se respetan si superan el mínimo
        assert_eq!(LkhParams::for_dimension(4, Some(9)).runs, 9);
        assert_eq!(LkhParams::for_dimension(40, Some(2)).runs, 10);
    }

    #[test]
    fn test_problem_file_format() {
        let matrix = vec![
            vec![0, 10, 20],
            vec![10, 0, 15],
            vec![20, 15, 0],
        ];
        let contents = problem_file_contents(&matrix);

        assert!(contents.contains("DIMENSION : 3"));
        assert!(contents.contains("EDGE_WEIGHT_TYPE : EXPLICIT"));
        assert!(contents.contains("EDGE_WEIGHT_FORMAT: FULL_MATRIX"));
        assert!(contents.contains("EDGE_WEIGHT_SECTION\n0 10 20\n10 0 15\n20 15 0\nEOF"));
    }

    #[test]
    fn test_param_file_popmusic_tiers() {
        let problem = Path::new("/tmp/problem.tsp");
        let output = Path::new("/tmp/output.tour");

        let small = param_file_contents(8, problem, output, LkhParams::for_dimension(8, None), 1);
        assert!(!small.contains("POPMUSIC"));
        assert!(small.contains("RUNS = 5"));

        let medium = param_file_contents(20, problem, output, LkhParams::for_dimension(20, None), 1);
        assert!(medium.contains("POPMUSIC_SAMPLE_SIZE = 8"));

        let large = param_file_contents(60, problem, output, LkhParams::for_dimension(60, None), 1);
        assert!(large.contains("POPMUSIC_SAMPLE_SIZE = 10"));
        assert!(large.contains("SUBGRADIENT = YES"));
        // el fichero de parámetros capa los runs a 5
        assert!(large.contains("RUNS = 5"));
    }

    #[test]
    fn test_parse_tour_file() {
        let contents = "NAME : output\nTYPE : TOUR\nDIMENSION : 4\nTOUR_SECTION\n1\n3\n2\n4\n-1\nEOF\n";
        let tour = parse_tour_file(contents, 4).unwrap();
        assert_eq!(tour, vec![0, 2, 1, 3]);
    }

    #[test]
    fn test_parse_tour_file_rotates_to_zero() {
        let contents = "TOUR_SECTION\n3\n4\n1\n2\n-1\n";
        let tour = parse_tour_file(contents, 4).unwrap();
        assert_eq!(tour[0], 0);
        assert_eq!(tour, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_parse_tour_file_rejects_non_permutation() {
        let contents = "TOUR_SECTION\n1\n1\n2\n-1\n";
        assert!(parse_tour_file(contents, 3).is_err());

        let contents = "TOUR_SECTION\n1\n2\n-1\n";
        assert!(parse_tour_file(contents, 3).is_err());

        let contents = "no tour here\n";
        assert!(parse_tour_file(contents, 3).is_err());
    }

    #[test]
    fn test_parse_cost_from_stdout() {
        let stdout = "Successes/Runs = 3/3\nCost.min = 1180\nTime.total = 0.5 sec.\n";
        assert_eq!(parse_cost_from_stdout(stdout), Some(1180.0));

        // se toma la primera línea con coste, igual que el formato "Cost ="
        let stdout = "Cost = 1234\n";
        assert_eq!(parse_cost_from_stdout(stdout), Some(1234.0));

        assert_eq!(parse_cost_from_stdout("nothing here"), None);
    }

    #[test]
    fn test_tour_cost_closes_the_loop() {
        let matrix = vec![
            vec![0, 10, 20],
            vec![10, 0, 15],
            vec![20, 15, 0],
        ];
        // 0 -> 1 -> 2 -> 0 = 10 + 15 + 20
        assert!((tour_cost(&matrix, &[0, 1, 2]) - 45.0).abs() < 1e-9);
    }
}
